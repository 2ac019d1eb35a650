//! # Completion Gateway
//!
//! Workers report staging outcomes to `POST /internal/staging/completed` with
//! the shared internal basic-auth credential. The gateway authenticates the
//! caller, decodes the envelope, checks the target and hands the result to
//! the staging task engine. Every failure is answered with the
//! `{code, description, error_code}` envelope.

pub mod completion;
pub mod credentials;
pub mod http_errors;
pub mod http_server;
pub mod routes;

pub use completion::{CompletionGateway, STAGING_FAILURE_MSG};
pub use credentials::BasicCredentials;
pub use http_errors::{json_error_handler, ErrorEnvelope};
pub use http_server::StagerHttpServer;
pub use routes::{configure, GatewayState};
