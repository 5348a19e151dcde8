mod cookie;

pub use cookie::{DEFAULT_SESSION_COOKIE_NAME, SessionCookie};
