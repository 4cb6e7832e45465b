//! OAuth 2.0 grant variants and their shared flow machinery.
//!
//! The grants form a closed set: each variant exposes the same two
//! lifecycle operations. `on_request` consumes an authorization callback if
//! the current query carries one; `on_unauthenticated` begins a fresh
//! authentication attempt. The orchestrator drives both, in that order.

mod client_credentials;
mod code;
mod code_pkce;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use rand::seq::SliceRandom;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use crate::AuthError;
use crate::context::{ATTEMPTS_KEY, ContextStrategy, STATE_KEY, StorageKind, VERIFIER_KEY};
use crate::token::OAuthToken;

pub use client_credentials::ClientCredentials;
pub use code::AuthorizationCode;
pub use code_pkce::AuthorizationCodePkce;

/// Where client id and secret travel on token-endpoint calls. `Header`
/// always wins over body placement when both would be possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialMode {
    /// Credentials embedded in the request body.
    #[default]
    Request,
    /// Credentials in an HTTP Basic `Authorization` header.
    Header,
}

/// What an authentication step actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A valid token covering the requested scopes was already stored.
    Authorized,
    /// A token-endpoint exchange completed and the token is stored.
    TokenObtained,
    /// The user agent was sent to the authorization endpoint; the flow
    /// resumes when the callback comes back.
    RedirectIssued,
}

#[derive(Debug)]
pub enum Grant {
    ClientCredentials(ClientCredentials),
    AuthorizationCode(AuthorizationCode),
    AuthorizationCodePkce(AuthorizationCodePkce),
}

impl Grant {
    /// Consume an authorization callback if the current query carries one.
    /// Returns whether a callback was consumed.
    pub async fn on_request(
        &self,
        ctx: &dyn ContextStrategy,
        kind: StorageKind,
    ) -> Result<bool, AuthError> {
        match self {
            // Client credentials never round-trips through a redirect.
            Grant::ClientCredentials(_) => Ok(false),
            Grant::AuthorizationCode(grant) => grant.on_request(ctx, kind).await,
            Grant::AuthorizationCodePkce(grant) => grant.on_request(ctx, kind).await,
        }
    }

    /// Begin authentication for `scopes`. Guarded by the attempt ceiling.
    pub async fn on_unauthenticated(
        &self,
        ctx: &dyn ContextStrategy,
        kind: StorageKind,
        scopes: &[&str],
    ) -> Result<AuthOutcome, AuthError> {
        match self {
            Grant::ClientCredentials(grant) => grant.on_unauthenticated(ctx, kind, scopes).await,
            Grant::AuthorizationCode(grant) => grant.on_unauthenticated(ctx, scopes).await,
            Grant::AuthorizationCodePkce(grant) => grant.on_unauthenticated(ctx, scopes).await,
        }
    }
}

impl From<ClientCredentials> for Grant {
    fn from(grant: ClientCredentials) -> Self {
        Grant::ClientCredentials(grant)
    }
}

impl From<AuthorizationCode> for Grant {
    fn from(grant: AuthorizationCode) -> Self {
        Grant::AuthorizationCode(grant)
    }
}

impl From<AuthorizationCodePkce> for Grant {
    fn from(grant: AuthorizationCodePkce) -> Self {
        Grant::AuthorizationCodePkce(grant)
    }
}

/// Unauthenticated attempts allowed per storage scope before the flow
/// fails with [`AuthError::Unauthenticated`].
pub const MAX_ATTEMPTS: u32 = 5;

/// Read, check, and bump the persisted attempt counter. Fails before any
/// redirect or network side effect once the ceiling is reached.
pub(crate) async fn register_attempt(ctx: &dyn ContextStrategy) -> Result<(), AuthError> {
    let attempts: u32 = ctx
        .get_temporary(ATTEMPTS_KEY)
        .await
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    if attempts >= MAX_ATTEMPTS {
        warn!(attempts, "unauthenticated attempt ceiling reached");
        return Err(AuthError::Unauthenticated);
    }
    ctx.save_temporary(ATTEMPTS_KEY, &(attempts + 1).to_string())
        .await;
    Ok(())
}

/// Generate and persist a CSRF state value: epoch millis and the joined
/// scope list, shuffled, then base64url-encoded.
pub(crate) async fn generate_state(ctx: &dyn ContextStrategy, scopes: &[&str]) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let mut chars: Vec<char> = format!("{millis}{}", scopes.join("_")).chars().collect();
    chars.shuffle(&mut rand::rng());
    let state = URL_SAFE_NO_PAD.encode(chars.into_iter().collect::<String>());
    ctx.save_temporary(STATE_KEY, &state).await;
    state
}

pub(crate) struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// The authorization callback payload, if the current query carries one.
pub(crate) async fn callback_params(ctx: &dyn ContextStrategy) -> Option<CallbackParams> {
    let query = ctx.query().await;
    Some(CallbackParams {
        code: query.get("code")?.clone(),
        state: query.get("state")?.clone(),
    })
}

/// Compare the callback state against the value saved when the flow began.
pub(crate) async fn validate_state(
    ctx: &dyn ContextStrategy,
    received: &str,
) -> Result<(), AuthError> {
    let saved = ctx.get_temporary(STATE_KEY).await;
    if saved.as_deref() != Some(received) {
        warn!("authorization callback state does not match the saved value");
        return Err(AuthError::ManInTheMiddle);
    }
    Ok(())
}

/// Drop the one-shot secrets of the completed attempt. The attempt counter
/// is deliberately left in place.
pub(crate) async fn clear_flow_secrets(ctx: &dyn ContextStrategy) {
    ctx.remove_temporary(STATE_KEY).await;
    ctx.remove_temporary(VERIFIER_KEY).await;
}

pub(crate) fn basic_auth_value(
    client_id: &str,
    client_secret: &str,
) -> Result<HeaderValue, AuthError> {
    let value = format!(
        "Basic {}",
        STANDARD.encode(format!("{client_id}:{client_secret}"))
    );
    HeaderValue::from_str(&value).map_err(|_| AuthError::InvalidHeader {
        name: AUTHORIZATION.to_string(),
        value,
    })
}

/// Shared token exchange: POST the parameter map as JSON, interpret the
/// response. An `error` payload removes the stored token and surfaces the
/// issuer's description; anything else is persisted verbatim as the new
/// token.
pub(crate) async fn exchange_token(
    ctx: &dyn ContextStrategy,
    kind: StorageKind,
    token_uri: &str,
    params: &HashMap<&'static str, String>,
    headers: HeaderMap,
) -> Result<OAuthToken, AuthError> {
    debug!(token_uri, "exchanging credentials at the token endpoint");
    let response: serde_json::Value = ctx
        .http()
        .post(token_uri)
        .headers(headers)
        .json(params)
        .send()
        .await?
        .json()
        .await?;

    let storage = ctx.token_storage(kind).await;
    if let Some(error) = response.get("error") {
        storage.remove();
        let description = response
            .get("error_description")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        warn!(%description, "token endpoint returned an error payload");
        return Err(AuthError::OAuth { description });
    }

    let token: OAuthToken =
        serde_json::from_value(response).map_err(|err| AuthError::InvalidResponse {
            message: err.to_string(),
        })?;
    storage.set(&token);
    info!("token persisted");
    Ok(token)
}
