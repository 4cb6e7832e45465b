//! Environment adapters for the grant state machine.
//!
//! The same flow runs in an interactive user-agent environment
//! ([`BrowserContext`]) or inside a server-rendered request/response cycle
//! ([`ServerContext`]); the grants only ever talk to the
//! [`ContextStrategy`] trait.

mod browser;
mod server;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::AuthError;
use crate::storage::TokenStorage;

pub use browser::BrowserContext;
pub use server::{ResponseDirectives, ServerContext, ServerContextBuilder, SharedState};

/// Where the token record is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    #[default]
    Cookie,
    LocalStorage,
}

/// Temporary-storage key for the CSRF state of the in-flight attempt.
pub const STATE_KEY: &str = "oauth-flow.state";
/// Temporary-storage key for the PKCE code verifier of the in-flight attempt.
pub const VERIFIER_KEY: &str = "oauth-flow.code-verifier";
/// Temporary-storage key for the unauthenticated attempt counter.
pub const ATTEMPTS_KEY: &str = "oauth-flow.attempts";

/// How the authentication core reaches its surrounding environment: query
/// parameters, navigation, HTTP transport, token persistence, and an
/// ephemeral key/value store that survives a redirect round trip.
#[async_trait]
pub trait ContextStrategy: Send + Sync {
    /// Query parameters of the current page or request.
    async fn query(&self) -> HashMap<String, String>;

    /// Send the user agent to `url`. Server contexts record the redirect
    /// for response finalization instead of navigating; they resolve
    /// without error.
    async fn redirect(&self, url: &str) -> Result<(), AuthError>;

    /// The HTTP client used for token-endpoint calls. Always injectable;
    /// no global transport exists in a server-rendered environment.
    fn http(&self) -> &reqwest::Client;

    /// The token storage for the configured kind in this environment.
    async fn token_storage(&self, kind: StorageKind) -> Arc<dyn TokenStorage>;

    async fn get_temporary(&self, key: &str) -> Option<String>;

    async fn save_temporary(&self, key: &str, value: &str);

    async fn remove_temporary(&self, key: &str);
}
