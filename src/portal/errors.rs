//! Error types for the portal client.

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// The identity provider rejected the submitted credentials.
    #[error("authentication rejected by the identity provider")]
    AuthenticationFailed,
    /// A handshake hop expected a `Location` header that was not present.
    #[error("handshake step '{step}' expected a redirect but got none")]
    MissingRedirect { step: &'static str },
    #[error("failed to parse response")]
    ParseFailed {
        status: u16,
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    RequestFailed(#[from] anyhow::Error),
}
