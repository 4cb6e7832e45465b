use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::AuthError;

/// RFC 7636 unreserved characters allowed in a code verifier.
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

pub const MIN_VERIFIER_LENGTH: usize = 43;
pub const MAX_VERIFIER_LENGTH: usize = 128;

#[derive(Debug, Clone)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkcePair {
    /// Generate a fresh verifier of `length` characters and its S256
    /// challenge. Lengths outside `43..=128` are rejected before any bytes
    /// are drawn.
    pub fn generate(length: usize) -> Result<Self, AuthError> {
        if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
            return Err(AuthError::VerifierLength { length });
        }
        let mut bytes = vec![0u8; length];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| AuthError::OsRng {
                message: err.to_string(),
            })?;
        let code_verifier: String = bytes
            .iter()
            .map(|byte| VERIFIER_CHARSET[*byte as usize % VERIFIER_CHARSET.len()] as char)
            .collect();
        Ok(Self::from_verifier(code_verifier))
    }

    pub fn from_verifier(code_verifier: impl Into<String>) -> Self {
        let code_verifier = code_verifier.into();
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        let digest = hasher.finalize();
        let code_challenge = URL_SAFE_NO_PAD.encode(digest);
        Self {
            code_verifier,
            code_challenge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_VERIFIER_LENGTH, MIN_VERIFIER_LENGTH, PkcePair, VERIFIER_CHARSET};
    use crate::AuthError;

    #[test]
    fn rejects_out_of_range_lengths() {
        for length in [0, 42, 129, 1024] {
            let result = PkcePair::generate(length);
            assert!(matches!(result, Err(AuthError::VerifierLength { .. })));
        }
    }

    #[test]
    fn generates_verifier_from_unreserved_charset() {
        for length in [MIN_VERIFIER_LENGTH, 64, MAX_VERIFIER_LENGTH] {
            let pkce = PkcePair::generate(length).unwrap();
            assert_eq!(pkce.code_verifier.len(), length);
            assert!(
                pkce.code_verifier
                    .bytes()
                    .all(|b| VERIFIER_CHARSET.contains(&b))
            );
        }
    }

    #[test]
    fn challenge_matches_rfc_7636_vector() {
        let pkce = PkcePair::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(
            pkce.code_challenge,
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn challenge_is_url_safe() {
        let pkce = PkcePair::generate(64).unwrap();
        for value in [&pkce.code_verifier, &pkce.code_challenge] {
            assert!(!value.contains('='), "pkce values should be unpadded");
            assert!(!value.contains('+'), "pkce values should be url safe");
            assert!(!value.contains('/'), "pkce values should be url safe");
        }
    }
}
