//! ID Token Claims
//!
//! Reading the claims of an ID token for display purposes.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ProtocolError;

/// `aud` may be a single string or a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Self::Single(aud) => aud == client_id,
            Self::Multiple(auds) => auds.iter().any(|a| a == client_id),
        }
    }
}

/// Standard OIDC claims plus anything else the provider put in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl IdTokenClaims {
    /// Decode the payload without verifying the signature.
    ///
    /// The result is only fit for display; nothing here establishes trust.
    pub fn decode_unverified(id_token: &str) -> Result<Self, ProtocolError> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<Self>(id_token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| ProtocolError::malformed(format!("invalid ID token: {}", e)))
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn sign(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"provider-key"),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_standard_claims() {
        let token = sign(json!({
            "iss": "https://openam.example.com",
            "sub": "user-1",
            "aud": "OIDCAndroidSample",
            "exp": 1_900_000_000,
            "given_name": "Leo",
            "locale": "fi"
        }));

        let claims = IdTokenClaims::decode_unverified(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.given_name.as_deref(), Some("Leo"));
        assert!(claims.aud.as_ref().unwrap().contains("OIDCAndroidSample"));
        assert_eq!(claims.extra.get("locale"), Some(&json!("fi")));
        assert!(claims.expires_at().is_some());
    }

    #[test]
    fn test_expired_token_still_decodes() {
        let token = sign(json!({
            "iss": "https://example.com",
            "sub": "user-1",
            "aud": ["a", "b"],
            "exp": 1
        }));

        let claims = IdTokenClaims::decode_unverified(&token).unwrap();
        assert!(claims.aud.unwrap().contains("b"));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let result = IdTokenClaims::decode_unverified("not-a-jwt");
        assert!(matches!(result, Err(ProtocolError::Malformed { .. })));
    }
}
