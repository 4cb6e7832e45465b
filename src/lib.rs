//! Embeddable OAuth 2.0 grant flows.
//!
//! This crate drives the Client Credentials, Authorization Code, and
//! Authorization Code + PKCE grants behind a pluggable environment seam:
//! the same state machine runs in an interactive user-agent environment or
//! inside a server-rendered request/response cycle. It persists the
//! resulting token, answers whether a caller is authorized for a set of
//! scopes, and produces an `Authorization` header for outgoing requests.

pub mod context;
mod cookie;
mod error;
mod grant;
#[cfg(feature = "local-server")]
mod listener;
mod pkce;
mod session;
mod storage;
mod token;

pub use context::{
    BrowserContext, ContextStrategy, ResponseDirectives, ServerContext, ServerContextBuilder,
    SharedState, StorageKind,
};
pub use cookie::CookieOptions;
pub use error::AuthError;
pub use grant::{
    AuthOutcome, AuthorizationCode, AuthorizationCodePkce, ClientCredentials, CredentialMode,
    Grant, MAX_ATTEMPTS,
};
#[cfg(feature = "local-server")]
pub use listener::CallbackListener;
pub use pkce::{MAX_VERIFIER_LENGTH, MIN_VERIFIER_LENGTH, PkcePair};
pub use session::Auth;
pub use storage::{
    CookieJar, CookieStorage, DEFAULT_COOKIE_NAME, MemoryJar, MemoryStorage, RequestStorage,
    TokenStorage,
};
pub use token::OAuthToken;
