//! ID token parsing and typed claim access.
use crate::errors::PortalError;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Claim set of a parsed ID token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Returns the claim only when it is present and a string.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.string("iss")
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

/// Turns a raw ID token string into its claims.
pub trait TokenVerifier: Send + Sync {
    fn parse(&self, id_token: &str) -> Result<Claims, PortalError>;
}

fn is_hmac(alg: &Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Parses ID tokens handed out by the token endpoint.
///
/// HMAC signed tokens are checked against the client secret. Tokens signed
/// with asymmetric keys are decoded without verifying the signature: they
/// were received straight from the token endpoint over TLS and are only
/// forwarded into the kubeconfig, where the API server verifies them.
/// Expiry is not checked, kubectl refreshes expired tokens itself.
#[derive(Clone)]
pub struct IdTokenParser {
    client_secret: String,
}

impl IdTokenParser {
    pub fn new(client_secret: &str) -> Self {
        Self {
            client_secret: client_secret.to_string(),
        }
    }

    fn validation(alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation
    }
}

impl TokenVerifier for IdTokenParser {
    fn parse(&self, id_token: &str) -> Result<Claims, PortalError> {
        let header = decode_header(id_token)?;
        let mut validation = Self::validation(header.alg);

        let key = if is_hmac(&header.alg) && !self.client_secret.is_empty() {
            DecodingKey::from_secret(self.client_secret.as_bytes())
        } else {
            validation.insecure_disable_signature_validation();
            DecodingKey::from_secret(&[])
        };

        let data = decode::<Map<String, Value>>(id_token, &key, &validation)?;
        Ok(Claims::new(data.claims))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    /// Signs `claims` with HS256 using `secret`.
    pub(crate) fn sign_hs256(claims: &Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("sign token")
    }

    #[test]
    fn parses_token_signed_with_client_secret() {
        let token = sign_hs256(
            &json!({"iss": "https://idp.example.com/", "nickname": "alice", "groups": ["dev"]}),
            "s3cret",
        );
        let claims = IdTokenParser::new("s3cret").parse(&token).expect("parse");
        assert_eq!(claims.issuer(), Some("https://idp.example.com/"));
        assert_eq!(claims.string("nickname"), Some("alice"));
        assert_eq!(claims.string("groups"), None);
        assert!(claims.get("groups").is_some());
    }

    #[test]
    fn rejects_hmac_token_with_wrong_secret() {
        let token = sign_hs256(&json!({"iss": "x", "nickname": "alice"}), "other");
        let result = IdTokenParser::new("s3cret").parse(&token);
        assert!(matches!(result, Err(PortalError::InvalidIdToken(_))));
    }

    #[test]
    fn without_secret_hmac_tokens_are_only_decoded() {
        let token = sign_hs256(&json!({"iss": "x", "sub": "123"}), "whatever");
        let claims = IdTokenParser::new("").parse(&token).expect("parse");
        assert_eq!(claims.string("sub"), Some("123"));
    }

    #[test]
    fn garbage_is_rejected() {
        let result = IdTokenParser::new("s3cret").parse("this.is.not-a-jwt");
        assert!(matches!(result, Err(PortalError::InvalidIdToken(_))));
    }
}
