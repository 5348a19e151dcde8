//! Registration and login ceremonies, and the request-level coordination around them.

mod coordination;
mod engine;
mod errors;

pub use coordination::{
    LOGIN_SUCCESS, REGISTRATION_SUCCESS, ServiceContext, handle_begin_login_core,
    handle_begin_registration_core, handle_finish_login_core, handle_finish_registration_core,
};
pub use engine::{CeremonyOutcome, RelyingParty};
pub use errors::CeremonyError;
