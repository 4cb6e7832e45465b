use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::AuthError;
use crate::context::{ContextStrategy, StorageKind};
use crate::storage::{
    CookieJar, CookieStorage, DEFAULT_COOKIE_NAME, MemoryJar, MemoryStorage, TokenStorage,
};

type Navigator = Box<dyn Fn(&str) -> Result<(), AuthError> + Send + Sync>;

/// Interactive user-agent environment.
///
/// Query parameters come from a settable current URL (fed by the embedder,
/// or by the callback listener after the authorization server redirects
/// back). `redirect` performs real navigation; by default it opens the
/// system browser. Temporary values live in a session-scoped in-memory map.
pub struct BrowserContext {
    http: reqwest::Client,
    navigator: Navigator,
    current_url: RwLock<Option<Url>>,
    temporary: RwLock<HashMap<String, String>>,
    cookies: Arc<dyn CookieJar>,
    cookie_name: String,
    local_storage: Arc<MemoryStorage>,
}

impl BrowserContext {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            navigator: Box::new(|url| webbrowser::open(url).map_err(AuthError::from)),
            current_url: RwLock::new(None),
            temporary: RwLock::new(HashMap::new()),
            cookies: Arc::new(MemoryJar::new()),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            local_storage: Arc::new(MemoryStorage::new()),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Replace how `redirect` reaches the user agent. Embedders that own
    /// navigation (or tests) capture the URL here instead of opening a
    /// browser.
    pub fn with_navigator(
        mut self,
        navigator: impl Fn(&str) -> Result<(), AuthError> + Send + Sync + 'static,
    ) -> Self {
        self.navigator = Box::new(navigator);
        self
    }

    /// Back the cookie storage kind with a real cookie jar (a browser
    /// embedding's document cookies, for instance).
    pub fn with_cookie_jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.cookies = jar;
        self
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Record the URL the user agent is currently on. The authorization
    /// callback is consumed from this URL's query parameters.
    pub fn set_callback_url(&self, url: &str) -> Result<(), AuthError> {
        let url = Url::parse(url)?;
        debug!(%url, "callback url recorded");
        if let Ok(mut current) = self.current_url.write() {
            *current = Some(url);
        }
        Ok(())
    }
}

impl Default for BrowserContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextStrategy for BrowserContext {
    async fn query(&self) -> HashMap<String, String> {
        let current = match self.current_url.read() {
            Ok(current) => current,
            Err(_) => return HashMap::new(),
        };
        current
            .as_ref()
            .map(|url| {
                url.query_pairs()
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn redirect(&self, url: &str) -> Result<(), AuthError> {
        debug!(url, "navigating user agent");
        (self.navigator)(url)
    }

    fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn token_storage(&self, kind: StorageKind) -> Arc<dyn TokenStorage> {
        match kind {
            StorageKind::Cookie => Arc::new(CookieStorage::new(
                self.cookies.clone(),
                self.cookie_name.clone(),
            )),
            StorageKind::LocalStorage => self.local_storage.clone(),
        }
    }

    async fn get_temporary(&self, key: &str) -> Option<String> {
        self.temporary.read().ok()?.get(key).cloned()
    }

    async fn save_temporary(&self, key: &str, value: &str) {
        if let Ok(mut temporary) = self.temporary.write() {
            temporary.insert(key.to_string(), value.to_string());
        }
    }

    async fn remove_temporary(&self, key: &str) {
        if let Ok(mut temporary) = self.temporary.write() {
            temporary.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::token::OAuthToken;

    #[tokio::test]
    async fn query_comes_from_the_recorded_url() {
        let context = BrowserContext::new();
        assert!(context.query().await.is_empty());

        context
            .set_callback_url("http://localhost/cb?code=abc&state=xyz")
            .unwrap();
        let query = context.query().await;
        assert_eq!(query.get("code").unwrap(), "abc");
        assert_eq!(query.get("state").unwrap(), "xyz");
    }

    #[tokio::test]
    async fn redirect_goes_through_the_navigator() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let context = BrowserContext::new().with_navigator(move |url| {
            sink.lock().unwrap().push(url.to_string());
            Ok(())
        });

        context.redirect("https://auth.example/authorize").await.unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["https://auth.example/authorize"]);
    }

    #[tokio::test]
    async fn temporary_storage_round_trip() {
        let context = BrowserContext::new();
        assert!(context.get_temporary("k").await.is_none());
        context.save_temporary("k", "v").await;
        assert_eq!(context.get_temporary("k").await.unwrap(), "v");
        context.remove_temporary("k").await;
        assert!(context.get_temporary("k").await.is_none());
    }

    #[tokio::test]
    async fn token_storage_kinds_share_backing_state() {
        let context = BrowserContext::new();
        let token = OAuthToken::new("t");

        for kind in [StorageKind::Cookie, StorageKind::LocalStorage] {
            let storage = context.token_storage(kind).await;
            storage.set(&token);
            // A fresh handle for the same kind sees the same record.
            let again = context.token_storage(kind).await;
            assert_eq!(again.get().unwrap(), token);
            again.remove();
            assert!(storage.get().is_none());
        }
    }
}
