use std::collections::HashMap;

use reqwest::header::HeaderMap;
use tracing::debug;
use url::Url;

use crate::AuthError;
use crate::context::{ContextStrategy, StorageKind, VERIFIER_KEY};
use crate::grant::{
    AuthOutcome, callback_params, clear_flow_secrets, exchange_token, generate_state,
    register_attempt, validate_state,
};
use crate::pkce::{MAX_VERIFIER_LENGTH, MIN_VERIFIER_LENGTH, PkcePair};

/// Authorization Code grant with PKCE, for public clients that cannot hold
/// a secret. The code verifier is persisted across the redirect round trip
/// and bound to the exchange; the challenge travels in the authorization
/// URL as `S256`.
#[derive(Debug, Clone)]
pub struct AuthorizationCodePkce {
    client_id: String,
    token_uri: String,
    authorization_uri: String,
    authorization_redirect_uri: String,
    post_login_redirect_uri: String,
    verifier_length: usize,
}

impl AuthorizationCodePkce {
    pub fn new(
        client_id: impl Into<String>,
        token_uri: impl Into<String>,
        authorization_uri: impl Into<String>,
        authorization_redirect_uri: impl Into<String>,
        post_login_redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            token_uri: token_uri.into(),
            authorization_uri: authorization_uri.into(),
            authorization_redirect_uri: authorization_redirect_uri.into(),
            post_login_redirect_uri: post_login_redirect_uri.into(),
            verifier_length: MAX_VERIFIER_LENGTH,
        }
    }

    /// Override the verifier length. Lengths outside `43..=128` are
    /// rejected here, before any flow runs.
    pub fn with_verifier_length(mut self, length: usize) -> Result<Self, AuthError> {
        if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
            return Err(AuthError::VerifierLength { length });
        }
        self.verifier_length = length;
        Ok(self)
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

        let code_verifier = ctx.get_temporary(VERIFIER_KEY).await.unwrap_or_default();
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code".to_string());
        params.insert("code", callback.code);
        params.insert("client_id", self.client_id.clone());
        params.insert("redirect_uri", self.post_login_redirect_uri.clone());
        params.insert("code_verifier", code_verifier);

        exchange_token(ctx, kind, &self.token_uri, &params, HeaderMap::new()).await?;
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

        let pkce = PkcePair::generate(self.verifier_length)?;
        ctx.save_temporary(VERIFIER_KEY, &pkce.code_verifier).await;

        let mut url = Url::parse(&self.authorization_uri)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("client_id", &self.client_id)
            .append_pair("state", &state)
            .append_pair("redirect_uri", &self.authorization_redirect_uri)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", "S256");

        ctx.redirect(url.as_str()).await?;
        Ok(AuthOutcome::RedirectIssued)
    }
}

#[cfg(test)]
mod tests {
    use super::AuthorizationCodePkce;
    use crate::AuthError;

    fn grant() -> AuthorizationCodePkce {
        AuthorizationCodePkce::new(
            "client",
            "https://auth.invalid/token",
            "https://auth.invalid/authorize",
            "https://app.invalid/callback",
            "https://app.invalid/",
        )
    }

    #[test]
    fn verifier_length_is_validated_at_construction() {
        assert!(matches!(
            grant().with_verifier_length(42),
            Err(AuthError::VerifierLength { length: 42 })
        ));
        assert!(grant().with_verifier_length(43).is_ok());
        assert!(grant().with_verifier_length(128).is_ok());
        assert!(grant().with_verifier_length(129).is_err());
    }
}
