use std::collections::HashMap;

use reqwest::header::{AUTHORIZATION, HeaderMap};

use crate::AuthError;
use crate::context::{ContextStrategy, StorageKind};
use crate::grant::{AuthOutcome, CredentialMode, basic_auth_value, exchange_token, register_attempt};

/// Machine-to-machine grant: client id and secret are exchanged directly
/// for a token. No redirect round trip is involved, so `on_request` has
/// nothing to consume for this variant.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    client_id: String,
    client_secret: String,
    token_uri: String,
    credential_mode: CredentialMode,
}

impl ClientCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_uri: token_uri.into(),
            credential_mode: CredentialMode::default(),
        }
    }

    pub fn with_credential_mode(mut self, credential_mode: CredentialMode) -> Self {
        self.credential_mode = credential_mode;
        self
    }

    pub(crate) async fn on_unauthenticated(
        &self,
        ctx: &dyn ContextStrategy,
        kind: StorageKind,
        scopes: &[&str],
    ) -> Result<AuthOutcome, AuthError> {
        register_attempt(ctx).await?;

        let mut params = HashMap::new();
        params.insert("grant_type", "client_credentials".to_string());
        params.insert("scope", scopes.join(" "));

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
        Ok(AuthOutcome::TokenObtained)
    }
}
