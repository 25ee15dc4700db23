//! Observability for the auth gateway.
//!
//! - Structured logging through `tracing`, pretty or JSON
//! - Redaction helpers so tokens and secrets never reach the logs verbatim

pub mod init;
pub mod redact;

pub use init::*;
pub use redact::*;
