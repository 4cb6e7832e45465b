use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication attempt limit exceeded")]
    Unauthenticated,

    #[error("state mismatch on authorization callback")]
    ManInTheMiddle,

    #[error("authorization server error: {description}")]
    OAuth { description: String },

    #[error("token does not grant the requested scopes")]
    Unauthorized,

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("authentication is not configured, call init first")]
    NotConfigured,

    #[error("code verifier length {length} outside 43..=128")]
    VerifierLength { length: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("os rng error: {message}")]
    OsRng { message: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid redirect uri: {0}")]
    InvalidRedirectUri(String),

    #[error("invalid header: {name}={value}")]
    InvalidHeader { name: String, value: String },

    #[error("invalid token response: {message}")]
    InvalidResponse { message: String },

    #[cfg(feature = "local-server")]
    #[error("callback listener error: {message}")]
    Listener { message: String },

    #[cfg(feature = "local-server")]
    #[error("callback listener timed out after {timeout:?}")]
    ListenerTimeout { timeout: std::time::Duration },
}
