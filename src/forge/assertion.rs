use base64::Engine;
use eyre::{eyre, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Produces an RS256-signed app assertion.
///
/// `iat` is backdated 60s to absorb small clock skew against the forge;
/// `exp` is set 600s out, matching the forge's maximum allowed window.
pub fn sign_app_assertion(app_id: &str, private_key_b64: &str, now_unix: i64) -> Result<String> {
    let pem = base64::engine::general_purpose::STANDARD
        .decode(private_key_b64)
        .map_err(|e| eyre!("app private key is not valid base64: {e}"))?;

    let key = EncodingKey::from_rsa_pem(&pem).map_err(|e| eyre!("invalid RSA private key PEM: {e}"))?;

    let claims = Claims {
        iat: now_unix - 60,
        exp: now_unix + 600,
        iss: app_id.to_string(),
    };

    encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| eyre!("failed to sign app assertion: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_base64_key() {
        let err = sign_app_assertion("123", "not-base64!!", 1_700_000_000).unwrap_err();
        assert!(err.to_string().contains("base64"));
    }
}
