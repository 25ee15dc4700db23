//! Shared data model for the auth gateway: canonical identities, sessions,
//! local credential records and the request/response bodies of the API.

pub mod auth;

pub use auth::*;
