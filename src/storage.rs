//! Token persistence backends.
//!
//! One token record per storage scope. All variants serialize the token as
//! JSON; a record that fails to parse on the way back out reads as "no
//! token" instead of failing the authentication check.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use tracing::warn;

use crate::cookie::{CookieOptions, parse_cookie_header, serialize_cookie};
use crate::token::OAuthToken;

/// Cookie under which the token record is persisted unless overridden.
pub const DEFAULT_COOKIE_NAME: &str = "oauth-token";

pub trait TokenStorage: Send + Sync {
    fn get(&self) -> Option<OAuthToken>;
    fn set(&self, token: &OAuthToken);
    fn remove(&self);
}

fn parse_token(raw: &str) -> Option<OAuthToken> {
    match serde_json::from_str(raw) {
        Ok(token) => Some(token),
        Err(err) => {
            warn!(error = %err, "stored token is not valid json, treating as absent");
            None
        }
    }
}

fn encode_token(token: &OAuthToken) -> Option<String> {
    match serde_json::to_string(token) {
        Ok(json) => Some(json),
        Err(err) => {
            warn!(error = %err, "failed to serialize token record");
            None
        }
    }
}

/// Volatile process-local storage, the counterpart of web local storage.
/// Holds the serialized record so corrupt data behaves the same as in the
/// durable variants.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    record: RwLock<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self) -> Option<OAuthToken> {
        let record = self.record.read().ok()?;
        parse_token(record.as_deref()?)
    }

    fn set(&self, token: &OAuthToken) {
        if let (Some(json), Ok(mut record)) = (encode_token(token), self.record.write()) {
            *record = Some(json);
        }
    }

    fn remove(&self) {
        if let Ok(mut record) = self.record.write() {
            *record = None;
        }
    }
}

/// Access to a live cookie jar. In a browser embedding this maps onto the
/// document cookie API; natively the in-memory [`MemoryJar`] stands in.
pub trait CookieJar: Send + Sync {
    fn read(&self, name: &str) -> Option<String>;
    fn write(&self, name: &str, value: &str, options: &CookieOptions);
    fn clear(&self, name: &str);
}

#[derive(Debug, Default)]
pub struct MemoryJar {
    cookies: RwLock<HashMap<String, String>>,
}

impl MemoryJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieJar for MemoryJar {
    fn read(&self, name: &str) -> Option<String> {
        self.cookies.read().ok()?.get(name).cloned()
    }

    fn write(&self, name: &str, value: &str, _options: &CookieOptions) {
        if let Ok(mut cookies) = self.cookies.write() {
            cookies.insert(name.to_string(), value.to_string());
        }
    }

    fn clear(&self, name: &str) {
        if let Ok(mut cookies) = self.cookies.write() {
            cookies.remove(name);
        }
    }
}

/// Cookie-backed storage: the token record lives as percent-encoded JSON in
/// a `SameSite=Strict` cookie.
pub struct CookieStorage {
    jar: std::sync::Arc<dyn CookieJar>,
    name: String,
}

impl CookieStorage {
    pub fn new(jar: std::sync::Arc<dyn CookieJar>, name: impl Into<String>) -> Self {
        Self {
            jar,
            name: name.into(),
        }
    }
}

impl TokenStorage for CookieStorage {
    fn get(&self) -> Option<OAuthToken> {
        parse_token(&self.jar.read(&self.name)?)
    }

    fn set(&self, token: &OAuthToken) {
        if let Some(json) = encode_token(token) {
            self.jar.write(&self.name, &json, &CookieOptions::strict());
        }
    }

    fn remove(&self) {
        self.jar.clear(&self.name);
    }
}

/// Server-request-scoped storage. Reads come from the captured inbound
/// `Cookie` header; writes stage a `Set-Cookie` value for the response and
/// update the request-visible view so later reads in the same request
/// observe the new token. No live cookie jar exists while a server-rendered
/// request is in flight.
pub struct RequestStorage {
    name: String,
    cookies: RwLock<HashMap<String, String>>,
    staged: Mutex<Option<String>>,
}

impl RequestStorage {
    pub fn from_header(name: impl Into<String>, cookie_header: &str) -> Self {
        Self {
            name: name.into(),
            cookies: RwLock::new(parse_cookie_header(cookie_header)),
            staged: Mutex::new(None),
        }
    }

    /// The `Set-Cookie` value staged by the last `set`/`remove`, if any.
    /// Consumed by response finalization.
    pub fn take_set_cookie(&self) -> Option<String> {
        self.staged.lock().ok()?.take()
    }
}

impl TokenStorage for RequestStorage {
    fn get(&self) -> Option<OAuthToken> {
        let cookies = self.cookies.read().ok()?;
        parse_token(cookies.get(&self.name)?)
    }

    fn set(&self, token: &OAuthToken) {
        let Some(json) = encode_token(token) else {
            return;
        };
        if let Ok(mut staged) = self.staged.lock() {
            *staged = Some(serialize_cookie(&self.name, &json, &CookieOptions::strict()));
        }
        if let Ok(mut cookies) = self.cookies.write() {
            cookies.insert(self.name.clone(), json);
        }
    }

    fn remove(&self) {
        if let Ok(mut staged) = self.staged.lock() {
            *staged = Some(serialize_cookie(
                &self.name,
                "deleted",
                &CookieOptions::removal(),
            ));
        }
        if let Ok(mut cookies) = self.cookies.write() {
            cookies.remove(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CookieJar, CookieStorage, DEFAULT_COOKIE_NAME, MemoryJar, MemoryStorage, RequestStorage,
        TokenStorage,
    };
    use crate::cookie::serialize_cookie;
    use crate::token::OAuthToken;

    fn sample_token() -> OAuthToken {
        let mut token = OAuthToken::new("t");
        token.scope = Some("read write".to_string());
        token
    }

    #[test]
    fn memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.get().is_none());
        let token = sample_token();
        storage.set(&token);
        assert_eq!(storage.get().unwrap(), token);
        storage.remove();
        assert!(storage.get().is_none());
    }

    #[test]
    fn cookie_storage_round_trip() {
        let storage = CookieStorage::new(std::sync::Arc::new(MemoryJar::new()), DEFAULT_COOKIE_NAME);
        let token = sample_token();
        storage.set(&token);
        assert_eq!(storage.get().unwrap(), token);
        storage.remove();
        assert!(storage.get().is_none());
    }

    #[test]
    fn malformed_record_reads_as_absent() {
        let jar = std::sync::Arc::new(MemoryJar::new());
        jar.write(
            DEFAULT_COOKIE_NAME,
            "{not json",
            &crate::cookie::CookieOptions::strict(),
        );
        let storage = CookieStorage::new(jar, DEFAULT_COOKIE_NAME);
        assert!(storage.get().is_none());
    }

    #[test]
    fn request_storage_reads_inbound_header() {
        let token = sample_token();
        let json = serde_json::to_string(&token).unwrap();
        let header = serialize_cookie(DEFAULT_COOKIE_NAME, &json, &crate::cookie::CookieOptions::strict());
        let cookie_pair = header.split(';').next().unwrap();
        let storage = RequestStorage::from_header(DEFAULT_COOKIE_NAME, cookie_pair);
        assert_eq!(storage.get().unwrap(), token);
        assert!(storage.take_set_cookie().is_none());
    }

    #[test]
    fn request_storage_stages_set_cookie_and_stays_readable() {
        let storage = RequestStorage::from_header(DEFAULT_COOKIE_NAME, "");
        let token = sample_token();
        storage.set(&token);
        assert_eq!(storage.get().unwrap(), token);

        let staged = storage.take_set_cookie().unwrap();
        assert!(staged.starts_with(DEFAULT_COOKIE_NAME));
        assert!(staged.contains("SameSite=Strict"));
        assert!(storage.take_set_cookie().is_none(), "staged value is consumed");
    }

    #[test]
    fn request_storage_removal_stages_expiry() {
        let storage = RequestStorage::from_header(DEFAULT_COOKIE_NAME, "");
        storage.set(&sample_token());
        let _ = storage.take_set_cookie();
        storage.remove();
        assert!(storage.get().is_none());
        let staged = storage.take_set_cookie().unwrap();
        assert!(staged.contains("Max-Age=0"));
    }

    #[test]
    fn request_storage_malformed_cookie_reads_as_absent() {
        let storage = RequestStorage::from_header(DEFAULT_COOKIE_NAME, "oauth-token=garbage");
        assert!(storage.get().is_none());
    }
}
