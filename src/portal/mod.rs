//! Client for the university portal: SSO handshake, evaluation discovery,
//! form autofill, and submission.

pub mod auth;
pub mod crypto;
pub mod discovery;
pub mod errors;
mod json;
pub mod form;
pub mod session;
pub mod submit;

pub use errors::PortalError;
pub use session::{DomainProfile, Session};
