//! The authentication handle and its orchestration entry point.

use std::sync::{Arc, RwLock};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tokio::sync::watch;
use tracing::debug;

use crate::AuthError;
use crate::context::{ContextStrategy, StorageKind};
use crate::grant::{AuthOutcome, Grant};
use crate::token::OAuthToken;

/// Explicit, caller-constructed authentication state: the active grant, the
/// environment strategy, and the token-storage kind, plus a readiness
/// barrier callers can await.
///
/// Clones share the same underlying state. `init` may be called again; it
/// overwrites the configuration and never re-blocks callers that already
/// passed [`Auth::ready`].
#[derive(Clone)]
pub struct Auth {
    inner: Arc<Inner>,
}

struct Inner {
    config: RwLock<Option<Config>>,
    ready: watch::Sender<bool>,
}

#[derive(Clone)]
struct Config {
    context: Arc<dyn ContextStrategy>,
    grant: Arc<Grant>,
    storage: StorageKind,
}

impl Auth {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(None),
                ready,
            }),
        }
    }

    /// Configure the handle and release everyone blocked in [`Auth::ready`].
    pub fn init(
        &self,
        context: Arc<dyn ContextStrategy>,
        grant: impl Into<Grant>,
        storage: StorageKind,
    ) {
        if let Ok(mut config) = self.inner.config.write() {
            *config = Some(Config {
                context,
                grant: Arc::new(grant.into()),
                storage,
            });
        }
        self.inner.ready.send_replace(true);
        debug!("authentication configured");
    }

    /// Suspend until [`Auth::init`] has been called. Resolves immediately
    /// ever after.
    pub async fn ready(&self) {
        let mut ready = self.inner.ready.subscribe();
        // wait_for fails only when the sender is dropped, which cannot
        // happen while `self` is alive.
        let _ = ready.wait_for(|configured| *configured).await;
    }

    fn config(&self) -> Result<Config, AuthError> {
        self.inner
            .config
            .read()
            .ok()
            .and_then(|config| config.clone())
            .ok_or(AuthError::NotConfigured)
    }

    async fn stored_token(&self) -> Result<Option<OAuthToken>, AuthError> {
        let config = self.config()?;
        let storage = config.context.token_storage(config.storage).await;
        Ok(storage.get())
    }

    /// Whether a token record exists in the configured storage.
    pub async fn has_token(&self) -> Result<bool, AuthError> {
        Ok(self.stored_token().await?.is_some())
    }

    /// Whether the stored token is past its expiry instant. A token without
    /// an expiry, or no token at all, is not expired.
    pub async fn token_expired(&self) -> Result<bool, AuthError> {
        Ok(self
            .stored_token()
            .await?
            .map(|token| token.is_expired())
            .unwrap_or(false))
    }

    /// Whether the stored token grants every requested scope.
    pub async fn is_authorized(&self, scopes: &[&str]) -> Result<bool, AuthError> {
        Ok(self
            .stored_token()
            .await?
            .map(|token| token.grants(scopes))
            .unwrap_or(false))
    }

    /// Set `Authorization: Bearer <access_token>` on `headers`, with an
    /// empty token when none is stored.
    pub async fn add_auth_header(&self, headers: &mut HeaderMap) -> Result<(), AuthError> {
        let access_token = self
            .stored_token()
            .await?
            .map(|token| token.access_token)
            .unwrap_or_default();
        let value = format!("Bearer {access_token}");
        let value = HeaderValue::from_str(&value).map_err(|_| AuthError::InvalidHeader {
            name: AUTHORIZATION.to_string(),
            value,
        })?;
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Drive one authentication step for `scopes`, in strict order: wait
    /// for configuration, let the grant consume an in-flight authorization
    /// callback, then decide — no token begins the unauthenticated flow, an
    /// expired token fails (refresh is deliberately unimplemented), a scope
    /// gap fails, and otherwise the caller is already authorized.
    pub async fn authenticate(&self, scopes: &[&str]) -> Result<AuthOutcome, AuthError> {
        self.ready().await;
        let config = self.config()?;
        let ctx = config.context.as_ref();

        config.grant.on_request(ctx, config.storage).await?;

        let token = ctx.token_storage(config.storage).await.get();
        match token {
            None => {
                config
                    .grant
                    .on_unauthenticated(ctx, config.storage, scopes)
                    .await
            }
            Some(token) if token.is_expired() => {
                Err(AuthError::NotImplemented("refresh token exchange"))
            }
            Some(token) if !token.grants(scopes) => Err(AuthError::Unauthorized),
            Some(_) => Ok(AuthOutcome::Authorized),
        }
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self::new()
    }
}
