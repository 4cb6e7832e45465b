use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::AuthError;
use crate::context::{ContextStrategy, StorageKind};
use crate::storage::{DEFAULT_COOKIE_NAME, MemoryStorage, RequestStorage, TokenStorage};

/// Process-wide state shared by every [`ServerContext`]: the temporary
/// key/value store and the volatile token storage. Temporary values are
/// keyed by the literal key, which is acceptable only because the flow is
/// short-lived and driven one request at a time.
#[derive(Clone, Default)]
pub struct SharedState {
    temporary: Arc<RwLock<HashMap<String, String>>>,
    local_storage: Arc<MemoryStorage>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One environment instance per server-rendered request.
///
/// Inbound cookies and query parameters are captured at construction. A
/// `redirect` is recorded, not performed; together with any staged
/// `Set-Cookie` it is handed back through [`ServerContext::response_directives`]
/// when the framework glue finalizes the response.
pub struct ServerContext {
    http: reqwest::Client,
    query: HashMap<String, String>,
    storage: Arc<RequestStorage>,
    shared: SharedState,
    pending_redirect: Mutex<Option<String>>,
}

pub struct ServerContextBuilder {
    shared: SharedState,
    http: reqwest::Client,
    cookie_name: String,
    cookie_header: String,
    query: HashMap<String, String>,
}

impl ServerContext {
    pub fn builder(shared: SharedState) -> ServerContextBuilder {
        ServerContextBuilder {
            shared,
            http: reqwest::Client::new(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_header: String::new(),
            query: HashMap::new(),
        }
    }

    /// Everything the outgoing response needs to pick up: the staged
    /// `Set-Cookie` value and the pending redirect (HTTP 302 with a
    /// `Location` header and an empty body). Consuming; a second call
    /// returns nothing.
    pub fn response_directives(&self) -> ResponseDirectives {
        let redirect = self
            .pending_redirect
            .lock()
            .ok()
            .and_then(|mut pending| pending.take());
        ResponseDirectives {
            set_cookie: self.storage.take_set_cookie(),
            redirect,
        }
    }
}

impl ServerContextBuilder {
    /// Capture query parameters from the full request URL.
    pub fn request_url(mut self, url: &str) -> Result<Self, AuthError> {
        let url = Url::parse(url)?;
        self.query = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        Ok(self)
    }

    /// Capture query parameters from a raw query string.
    pub fn query_string(mut self, query: &str) -> Self {
        self.query = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        self
    }

    /// Capture the inbound `Cookie` header before the request is resolved.
    pub fn cookie_header(mut self, header: &str) -> Self {
        self.cookie_header = header.to_string();
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn build(self) -> ServerContext {
        ServerContext {
            http: self.http,
            query: self.query,
            storage: Arc::new(RequestStorage::from_header(
                self.cookie_name,
                &self.cookie_header,
            )),
            shared: self.shared,
            pending_redirect: Mutex::new(None),
        }
    }
}

/// Staged response mutations, applied by the caller-owned finalization step.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResponseDirectives {
    pub set_cookie: Option<String>,
    pub redirect: Option<String>,
}

impl ResponseDirectives {
    /// `Some(302)` when a redirect is pending.
    pub fn status(&self) -> Option<u16> {
        self.redirect.as_ref().map(|_| 302)
    }

    pub fn is_empty(&self) -> bool {
        self.set_cookie.is_none() && self.redirect.is_none()
    }
}

#[async_trait]
impl ContextStrategy for ServerContext {
    async fn query(&self) -> HashMap<String, String> {
        self.query.clone()
    }

    async fn redirect(&self, url: &str) -> Result<(), AuthError> {
        debug!(url, "redirect recorded for response finalization");
        if let Ok(mut pending) = self.pending_redirect.lock() {
            *pending = Some(url.to_string());
        }
        Ok(())
    }

    fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn token_storage(&self, kind: StorageKind) -> Arc<dyn TokenStorage> {
        match kind {
            StorageKind::Cookie => self.storage.clone(),
            StorageKind::LocalStorage => self.shared.local_storage.clone(),
        }
    }

    async fn get_temporary(&self, key: &str) -> Option<String> {
        self.shared.temporary.read().ok()?.get(key).cloned()
    }

    async fn save_temporary(&self, key: &str, value: &str) {
        if let Ok(mut temporary) = self.shared.temporary.write() {
            temporary.insert(key.to_string(), value.to_string());
        }
    }

    async fn remove_temporary(&self, key: &str) {
        if let Ok(mut temporary) = self.shared.temporary.write() {
            temporary.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::OAuthToken;

    #[tokio::test]
    async fn captures_query_from_request_url() {
        let context = ServerContext::builder(SharedState::new())
            .request_url("https://app.example/cb?code=abc&state=xyz")
            .unwrap()
            .build();
        let query = context.query().await;
        assert_eq!(query.get("code").unwrap(), "abc");
        assert_eq!(query.get("state").unwrap(), "xyz");
    }

    #[tokio::test]
    async fn redirect_is_deferred_into_directives() {
        let context = ServerContext::builder(SharedState::new()).build();
        context.redirect("https://auth.example/authorize").await.unwrap();

        let directives = context.response_directives();
        assert_eq!(directives.status(), Some(302));
        assert_eq!(
            directives.redirect.as_deref(),
            Some("https://auth.example/authorize")
        );
        assert!(context.response_directives().is_empty(), "directives are consumed");
    }

    #[tokio::test]
    async fn stored_token_stages_a_set_cookie() {
        let context = ServerContext::builder(SharedState::new()).build();
        let storage = context.token_storage(StorageKind::Cookie).await;
        storage.set(&OAuthToken::new("t"));

        let directives = context.response_directives();
        let set_cookie = directives.set_cookie.as_ref().unwrap();
        assert!(set_cookie.starts_with(DEFAULT_COOKIE_NAME));
        assert!(directives.redirect.is_none());
        assert!(directives.status().is_none());
    }

    #[tokio::test]
    async fn temporary_values_survive_across_requests() {
        let shared = SharedState::new();
        let first = ServerContext::builder(shared.clone()).build();
        first.save_temporary("k", "v").await;

        // A later request sees what the redirect round trip left behind.
        let second = ServerContext::builder(shared).build();
        assert_eq!(second.get_temporary("k").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn inbound_cookie_header_is_readable() {
        let token = OAuthToken::new("t");
        let json = serde_json::to_string(&token).unwrap();
        let header = format!("{}={}", DEFAULT_COOKIE_NAME, urlencoding::encode(&json));
        let context = ServerContext::builder(SharedState::new())
            .cookie_header(&header)
            .build();
        let storage = context.token_storage(StorageKind::Cookie).await;
        assert_eq!(storage.get().unwrap(), token);
    }
}
