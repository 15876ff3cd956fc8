use crate::config::PortalConfig;
use crate::errors::PortalError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openidconnect::core::{
    CoreAuthDisplay, CoreAuthPrompt, CoreClient, CoreErrorResponseType, CoreGenderClaim, CoreJsonWebKey,
    CoreJsonWebKeySet, CoreJweContentEncryptionAlgorithm, CoreResponseType, CoreRevocableToken,
    CoreRevocationErrorResponse, CoreTokenIntrospectionResponse, CoreTokenResponse,
};
use openidconnect::reqwest;
use openidconnect::url::Url;
use openidconnect::{
    AuthUrl, AuthenticationFlow, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EmptyAdditionalClaims, EndpointNotSet, EndpointSet, IssuerUrl, Nonce,
    OAuth2TokenResponse, RedirectUrl, Scope, StandardErrorResponse, TokenResponse, TokenUrl,
};
use rand::RngCore;
use std::time::Duration;

pub type OpenIDClient<
    HasDeviceAuthUrl = EndpointNotSet,
    HasIntrospectionUrl = EndpointNotSet,
    HasRevocationUrl = EndpointNotSet,
    HasAuthUrl = EndpointSet,
    HasTokenUrl = EndpointSet,
    HasUserInfoUrl = EndpointNotSet,
> = openidconnect::Client<
    EmptyAdditionalClaims,
    CoreAuthDisplay,
    CoreGenderClaim,
    CoreJweContentEncryptionAlgorithm,
    CoreJsonWebKey,
    CoreAuthPrompt,
    StandardErrorResponse<CoreErrorResponseType>,
    CoreTokenResponse,
    CoreTokenIntrospectionResponse,
    CoreRevocableToken,
    CoreRevocationErrorResponse,
    HasAuthUrl,
    HasDeviceAuthUrl,
    HasIntrospectionUrl,
    HasRevocationUrl,
    HasTokenUrl,
    HasUserInfoUrl,
>;

/// Timeout for the outbound token request.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Generate a vector of cryptographically secure random bytes of length `len`.
pub fn generate_random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// A fresh anti-CSRF state: 32 random bytes, standard base64.
pub fn generate_state() -> String {
    STANDARD.encode(generate_random_bytes(32))
}

/// Tokens obtained from the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangedTokens {
    pub id_token: String,
    pub refresh_token: Option<String>,
}

/// The OAuth2 side of the login flow.
#[rocket::async_trait]
pub trait TokenExchanger: Send + Sync {
    /// URL of the provider's authorization endpoint carrying `state` and,
    /// when non-empty, the `audience` parameter.
    fn authorize_url(&self, state: &str, audience: &str) -> String;

    /// Exchanges a single-use authorization code. Never retried.
    async fn exchange_code(&self, code: &str) -> Result<ExchangedTokens, PortalError>;
}

/// Builds the HTTP client used to talk to the token endpoint.
///
/// Redirects are not followed. When `trusted_ca_path` is configured that CA is
/// added to the trusted roots.
pub fn build_http_client(config: &PortalConfig) -> Result<reqwest::Client, PortalError> {
    let mut builder = reqwest::ClientBuilder::new()
        // Following redirects opens the client up to SSRF vulnerabilities.
        .redirect(reqwest::redirect::Policy::none())
        .timeout(TOKEN_REQUEST_TIMEOUT);

    if let Some(path) = &config.trusted_ca_path {
        let pem = std::fs::read(path)?;
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        log::info!("trusting additional CA from {}", path.display());
    }

    Ok(builder.build()?)
}

/// The provider does not have to publish an issuer to us, so the origin of
/// the authorization endpoint stands in for it.
fn issuer_from_authorize_url(authorize_url: &str) -> Result<IssuerUrl, PortalError> {
    let url = Url::parse(authorize_url)?;
    Ok(IssuerUrl::new(url.origin().ascii_serialization())?)
}

/// OAuth2 authorization code client backed by `openidconnect`.
#[derive(Debug, Clone)]
pub struct OIDCClient {
    pub client: OpenIDClient,
    reqwest_client: reqwest::Client,
    scopes: Vec<Scope>,
}

impl OIDCClient {
    pub fn from_config(config: &PortalConfig) -> Result<Self, PortalError> {
        Self::with_http_client(config, build_http_client(config)?)
    }

    pub fn with_http_client(
        config: &PortalConfig,
        reqwest_client: reqwest::Client,
    ) -> Result<Self, PortalError> {
        let client = CoreClient::new(
            ClientId::new(config.client_id.clone()),
            issuer_from_authorize_url(&config.authorize_url)?,
            CoreJsonWebKeySet::new(Vec::new()),
        )
        .set_client_secret(ClientSecret::new(config.client_secret.clone()))
        .set_auth_uri(AuthUrl::new(config.authorize_url.clone())?)
        .set_token_uri(TokenUrl::new(config.token_url.clone())?)
        .set_redirect_uri(RedirectUrl::new(config.redirect_url.clone())?);

        // "openid" is always requested by the authentication flow.
        let scopes = config
            .scopes
            .iter()
            .filter(|scope| scope.as_str() != "openid")
            .map(|scope| Scope::new(scope.clone()))
            .collect();

        Ok(Self {
            client,
            reqwest_client,
            scopes,
        })
    }
}

#[rocket::async_trait]
impl TokenExchanger for OIDCClient {
    fn authorize_url(&self, state: &str, audience: &str) -> String {
        let state = state.to_string();
        let mut request = self
            .client
            .authorize_url(
                AuthenticationFlow::<CoreResponseType>::AuthorizationCode,
                move || CsrfToken::new(state),
                Nonce::new_random,
            )
            .add_scopes(self.scopes.iter().cloned());
        if !audience.is_empty() {
            request = request.add_extra_param("audience", audience.to_string());
        }
        let (url, _state, _nonce) = request.url();
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<ExchangedTokens, PortalError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.reqwest_client)
            .await?;

        let id_token = response
            .id_token()
            .map(|token| token.to_string())
            .ok_or(PortalError::MissingIdToken)?;
        let refresh_token = response
            .refresh_token()
            .map(|token| token.secret().to_string());

        Ok(ExchangedTokens {
            id_token,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PortalConfig {
        PortalConfig {
            cluster_name: "prod".to_string(),
            authorize_url: "https://idp.example.com/authorize".to_string(),
            token_url: "https://idp.example.com/oauth/token".to_string(),
            client_id: "gangway".to_string(),
            client_secret: "s3cret".to_string(),
            redirect_url: "https://gangway.example.com/callback".to_string(),
            api_server_url: "https://k8s.example.com:6443".to_string(),
            ..PortalConfig::default()
        }
    }

    fn query(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .expect("valid url")
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn state_is_32_random_bytes_in_base64() {
        let state = generate_state();
        let decoded = STANDARD.decode(&state).expect("base64");
        assert_eq!(decoded.len(), 32);
        assert_ne!(state, generate_state());
    }

    #[test]
    fn authorize_url_carries_state_audience_and_scopes() {
        let client = OIDCClient::from_config(&config()).expect("client");
        let url = client.authorize_url("abc+/=", "https://k8s.example.com");
        assert!(url.starts_with("https://idp.example.com/authorize?"));

        let params = query(&url);
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("state"), Some("abc+/="));
        assert_eq!(get("audience"), Some("https://k8s.example.com"));
        assert_eq!(get("client_id"), Some("gangway"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(
            get("redirect_uri"),
            Some("https://gangway.example.com/callback")
        );
        let scope = get("scope").expect("scope");
        for expected in ["openid", "profile", "email", "offline_access"] {
            assert!(scope.split(' ').any(|s| s == expected), "missing {expected}");
        }
    }

    #[test]
    fn token_endpoint_comes_from_config() {
        let client = OIDCClient::from_config(&config()).expect("client");
        assert_eq!(
            client.client.token_uri().url().as_str(),
            "https://idp.example.com/oauth/token"
        );
    }

    #[test]
    fn empty_audience_is_left_out() {
        let client = OIDCClient::from_config(&config()).expect("client");
        let url = client.authorize_url("xyz", "");
        assert!(query(&url).iter().all(|(k, _)| k != "audience"));
    }

    #[test]
    fn bad_trusted_ca_path_fails_client_construction() {
        let mut config = config();
        config.trusted_ca_path = Some("/nonexistent/ca.pem".into());
        assert!(matches!(
            OIDCClient::from_config(&config),
            Err(PortalError::IO(_))
        ));
    }
}
