use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
};

use passkey_rp::{
    CreationOptionsResponse, LoginResponse, RegistrationResponse, RequestOptionsResponse,
    ServiceContext, handle_begin_login_core, handle_begin_registration_core,
    handle_finish_login_core, handle_finish_registration_core,
};

use crate::error::{IntoResponseError, ResponseError, malformed_body};

pub(crate) async fn begin_registration(
    State(ctx): State<Arc<ServiceContext>>,
    Path(username): Path<String>,
    request_headers: HeaderMap,
) -> Result<(HeaderMap, Json<CreationOptionsResponse>), ResponseError> {
    let (headers, options) = handle_begin_registration_core(&ctx, &username, &request_headers)
        .await
        .into_response_error()?;
    Ok((headers, Json(options)))
}

pub(crate) async fn finish_registration(
    State(ctx): State<Arc<ServiceContext>>,
    Path(username): Path<String>,
    request_headers: HeaderMap,
    payload: Result<Json<RegistrationResponse>, JsonRejection>,
) -> Result<(HeaderMap, Json<String>), ResponseError> {
    let Json(response) = payload.map_err(malformed_body)?;
    let (headers, message) =
        handle_finish_registration_core(&ctx, &username, &request_headers, response)
            .await
            .into_response_error()?;
    Ok((headers, Json(message)))
}

pub(crate) async fn begin_login(
    State(ctx): State<Arc<ServiceContext>>,
    Path(username): Path<String>,
    request_headers: HeaderMap,
) -> Result<(HeaderMap, Json<RequestOptionsResponse>), ResponseError> {
    let (headers, options) = handle_begin_login_core(&ctx, &username, &request_headers)
        .await
        .into_response_error()?;
    Ok((headers, Json(options)))
}

pub(crate) async fn finish_login(
    State(ctx): State<Arc<ServiceContext>>,
    Path(username): Path<String>,
    request_headers: HeaderMap,
    payload: Result<Json<LoginResponse>, JsonRejection>,
) -> Result<(HeaderMap, Json<String>), ResponseError> {
    let Json(response) = payload.map_err(malformed_body)?;
    let (headers, message) = handle_finish_login_core(&ctx, &username, &request_headers, response)
        .await
        .into_response_error()?;
    Ok((headers, Json(message)))
}
