//! passkey-rp-axum - HTTP endpoints for the passkey-rp ceremony engine

mod error;
mod passkey;
mod router;

pub use error::{IntoResponseError, ResponseError};
pub use router::{passkey_router, passkey_router_no_trace};

pub use passkey_rp::ServiceContext;
