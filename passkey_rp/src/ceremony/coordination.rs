use http::HeaderMap;

use crate::passkey::{
    CreationOptionsResponse, LoginResponse, RegistrationResponse, RequestOptionsResponse, User,
};
use crate::session::SessionCookie;

use super::engine::RelyingParty;
use super::errors::CeremonyError;

const MAX_USERNAME_LEN: usize = 256;

pub const REGISTRATION_SUCCESS: &str = "Registration Success";
pub const LOGIN_SUCCESS: &str = "Login Success";

/// Everything a request handler needs: the relying party and the cookie that carries
/// the challenge handle between begin and finish.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub rp: RelyingParty,
    pub session: SessionCookie,
}

impl ServiceContext {
    pub fn new(rp: RelyingParty, session: SessionCookie) -> Self {
        Self { rp, session }
    }
}

fn validate_username(username: &str) -> Result<(), CeremonyError> {
    if username.trim().is_empty()
        || username.len() > MAX_USERNAME_LEN
        || username.chars().any(char::is_control)
    {
        return Err(CeremonyError::InvalidUsername(
            "must supply a valid username i.e. foo@bar.com".to_string(),
        )
        .log());
    }
    Ok(())
}

fn display_name_of(username: &str) -> &str {
    username.split('@').next().unwrap_or(username)
}

async fn existing_user(ctx: &ServiceContext, username: &str) -> Result<User, CeremonyError> {
    ctx.rp
        .credential_store()
        .get_user(username)
        .await?
        .ok_or_else(|| CeremonyError::UserNotFound(username.to_string()).log())
}

/// A new begin makes the ceremony named by the request's previous cookie unusable.
async fn invalidate_previous(ctx: &ServiceContext, headers: &HeaderMap) {
    let Some(handle) = ctx.session.handle_from_headers(headers) else {
        return;
    };
    match ctx.rp.challenge_store().consume(&handle).await {
        Ok(true) => tracing::debug!("Invalidated previous ceremony"),
        Ok(false) => {}
        Err(e) => tracing::warn!("Failed to invalidate previous ceremony: {}", e),
    }
}

fn session_handle(
    ctx: &ServiceContext,
    headers: &HeaderMap,
) -> Result<crate::passkey::ChallengeHandle, CeremonyError> {
    ctx.session
        .handle_from_headers(headers)
        .ok_or_else(|| CeremonyError::SessionNotFound.log())
}

/// Begins registration, creating the user on first contact.
pub async fn handle_begin_registration_core(
    ctx: &ServiceContext,
    username: &str,
    headers: &HeaderMap,
) -> Result<(HeaderMap, CreationOptionsResponse), CeremonyError> {
    validate_username(username)?;

    let store = ctx.rp.credential_store();
    let user = match store.get_user(username).await? {
        Some(user) => user,
        None => {
            tracing::info!("Creating user {}", username);
            store
                .put_user(User::new(username, display_name_of(username))?)
                .await?
        }
    };

    invalidate_previous(ctx, headers).await;

    let (options, handle) = ctx
        .rp
        .begin_registration(&user)
        .await
        .map_err(CeremonyError::log)?;

    let mut response_headers = HeaderMap::new();
    ctx.session.set_header(&mut response_headers, &handle)?;

    Ok((response_headers, options))
}

pub async fn handle_finish_registration_core(
    ctx: &ServiceContext,
    username: &str,
    headers: &HeaderMap,
    response: RegistrationResponse,
) -> Result<(HeaderMap, String), CeremonyError> {
    validate_username(username)?;
    let user = existing_user(ctx, username).await?;
    let handle = session_handle(ctx, headers)?;

    ctx.rp
        .finish_registration(&user, &handle, &response)
        .await
        .map_err(CeremonyError::log)?;

    let mut response_headers = HeaderMap::new();
    ctx.session.clear_header(&mut response_headers)?;

    Ok((response_headers, REGISTRATION_SUCCESS.to_string()))
}

pub async fn handle_begin_login_core(
    ctx: &ServiceContext,
    username: &str,
    headers: &HeaderMap,
) -> Result<(HeaderMap, RequestOptionsResponse), CeremonyError> {
    validate_username(username)?;
    let user = existing_user(ctx, username).await?;

    invalidate_previous(ctx, headers).await;

    let (options, handle) = ctx
        .rp
        .begin_login(&user)
        .await
        .map_err(CeremonyError::log)?;

    let mut response_headers = HeaderMap::new();
    ctx.session.set_header(&mut response_headers, &handle)?;

    Ok((response_headers, options))
}

pub async fn handle_finish_login_core(
    ctx: &ServiceContext,
    username: &str,
    headers: &HeaderMap,
    response: LoginResponse,
) -> Result<(HeaderMap, String), CeremonyError> {
    validate_username(username)?;
    let user = existing_user(ctx, username).await?;
    let handle = session_handle(ctx, headers)?;

    ctx.rp
        .finish_login(&user, &handle, &response)
        .await
        .map_err(CeremonyError::log)?;

    let mut response_headers = HeaderMap::new();
    ctx.session.clear_header(&mut response_headers)?;

    Ok((response_headers, LOGIN_SUCCESS.to_string()))
}
