use std::collections::HashMap;

use reqwest::header::{AUTHORIZATION, HeaderMap};
use tracing::debug;
use url::Url;

use crate::AuthError;
use crate::context::{ContextStrategy, StorageKind};
use crate::grant::{
    AuthOutcome, CredentialMode, basic_auth_value, callback_params, clear_flow_secrets,
    exchange_token, generate_state, register_attempt, validate_state,
};

/// Authorization Code grant for confidential clients.
///
/// `on_unauthenticated` sends the user agent to the authorization endpoint
/// with a fresh CSRF state; `on_request` consumes the `code`/`state`
/// callback, exchanges the code, and redirects to the post-login URI.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    client_id: String,
    client_secret: String,
    token_uri: String,
    authorization_uri: String,
    authorization_redirect_uri: String,
    post_login_redirect_uri: String,
    credential_mode: CredentialMode,
}

impl AuthorizationCode {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_uri: impl Into<String>,
        authorization_uri: impl Into<String>,
        authorization_redirect_uri: impl Into<String>,
        post_login_redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_uri: token_uri.into(),
            authorization_uri: authorization_uri.into(),
            authorization_redirect_uri: authorization_redirect_uri.into(),
            post_login_redirect_uri: post_login_redirect_uri.into(),
            credential_mode: CredentialMode::default(),
        }
    }

    pub fn with_credential_mode(mut self, credential_mode: CredentialMode) -> Self {
        self.credential_mode = credential_mode;
        self
    }

    pub(crate) async fn on_request(
        &self,
        ctx: &dyn ContextStrategy,
        kind: StorageKind,
    ) -> Result<bool, AuthError> {
        let Some(callback) = callback_params(ctx).await else {
            return Ok(false);
        };
        validate_state(ctx, &callback.state).await?;

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code".to_string());
        params.insert("code", callback.code);
        params.insert("redirect_uri", self.post_login_redirect_uri.clone());

        let mut headers = HeaderMap::new();
        match self.credential_mode {
            CredentialMode::Request => {
                params.insert("client_id", self.client_id.clone());
                params.insert("client_secret", self.client_secret.clone());
            }
            CredentialMode::Header => {
                headers.insert(
                    AUTHORIZATION,
                    basic_auth_value(&self.client_id, &self.client_secret)?,
                );
            }
        }

        exchange_token(ctx, kind, &self.token_uri, &params, headers).await?;
        clear_flow_secrets(ctx).await;
        debug!("authorization callback consumed");
        ctx.redirect(&self.post_login_redirect_uri).await?;
        Ok(true)
    }

    pub(crate) async fn on_unauthenticated(
        &self,
        ctx: &dyn ContextStrategy,
        scopes: &[&str],
    ) -> Result<AuthOutcome, AuthError> {
        register_attempt(ctx).await?;
        let state = generate_state(ctx, scopes).await;

        let mut url = Url::parse(&self.authorization_uri)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("client_id", &self.client_id)
            .append_pair("state", &state)
            .append_pair("redirect_uri", &self.authorization_redirect_uri);

        ctx.redirect(url.as_str()).await?;
        Ok(AuthOutcome::RedirectIssued)
    }
}
