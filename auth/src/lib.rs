//! Session-based auth gateway.
//!
//! Local email/password accounts and Google/GitHub OAuth sign-in, all ending
//! in the same server-side session referenced by a signed `sid` cookie.

pub mod app;
pub mod error;
pub mod handlers;
pub mod services;

pub use app::{build_state, configure_routes, AppState};
pub use error::ApiError;
