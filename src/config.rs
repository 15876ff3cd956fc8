//! Static configuration of the portal.
//!
//! A [`PortalConfig`] is read from an optional YAML file, then every
//! `GANGWAY_*` environment variable that is set overrides the matching field.
use crate::errors::PortalError;
use serde_derive::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_CLUSTER_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// An additional cluster advertised in generated kubeconfigs next to the primary one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRef {
    pub name: String,
    pub server: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub cluster_name: String,
    pub authorize_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub allow_empty_client_secret: bool,
    pub audience: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub username_claim: String,
    /// Deprecated, only triggers a warning.
    pub email_claim: String,
    #[serde(rename = "apiserver_url")]
    pub api_server_url: String,
    pub cluster_ca_path: PathBuf,
    /// Extra root CA trusted by the HTTP client used for the token exchange.
    pub trusted_ca_path: Option<PathBuf>,
    pub http_path: String,
    /// Rocket secret key (base64 or hex, 256 or 512 bits) used to encrypt session cookies.
    pub session_security_key: Option<String>,
    pub require_refresh_token: bool,
    pub clusters: Vec<ClusterRef>,
}

impl Default for PortalConfig {
    fn default() -> PortalConfig {
        Self {
            cluster_name: String::new(),
            authorize_url: String::new(),
            token_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            allow_empty_client_secret: false,
            audience: String::new(),
            redirect_url: String::new(),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "offline_access".to_string(),
            ],
            username_claim: "nickname".to_string(),
            email_claim: String::new(),
            api_server_url: String::new(),
            cluster_ca_path: PathBuf::from(DEFAULT_CLUSTER_CA_PATH),
            trusted_ca_path: None,
            http_path: String::new(),
            session_security_key: None,
            require_refresh_token: true,
            clusters: Vec::new(),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, PortalError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(PortalError::InvalidConfig(format!(
            "{key} must be a boolean, got {other:?}"
        ))),
    }
}

impl PortalConfig {
    /// Reads a YAML configuration file. Missing keys keep their defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, PortalError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, PortalError> {
        serde_yaml::from_str(contents).map_err(PortalError::ConfigFile)
    }

    /// Builds a validated config from the process environment only.
    pub fn from_env() -> Result<Self, PortalError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), PortalError> {
        self.apply_lookup(|key| env::var(key).ok())
    }

    /// Overrides fields from `lookup`, which maps `GANGWAY_*` names to values.
    pub fn apply_lookup<F>(&mut self, lookup: F) -> Result<(), PortalError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strings: [(&str, &mut String); 11] = [
            ("GANGWAY_CLUSTER_NAME", &mut self.cluster_name),
            ("GANGWAY_AUTHORIZE_URL", &mut self.authorize_url),
            ("GANGWAY_TOKEN_URL", &mut self.token_url),
            ("GANGWAY_CLIENT_ID", &mut self.client_id),
            ("GANGWAY_CLIENT_SECRET", &mut self.client_secret),
            ("GANGWAY_AUDIENCE", &mut self.audience),
            ("GANGWAY_REDIRECT_URL", &mut self.redirect_url),
            ("GANGWAY_USERNAME_CLAIM", &mut self.username_claim),
            ("GANGWAY_EMAIL_CLAIM", &mut self.email_claim),
            ("GANGWAY_APISERVER_URL", &mut self.api_server_url),
            ("GANGWAY_HTTP_PATH", &mut self.http_path),
        ];
        for (key, field) in strings {
            if let Some(value) = lookup(key) {
                *field = value;
            }
        }

        if let Some(path) = lookup("GANGWAY_CLUSTER_CA_PATH") {
            self.cluster_ca_path = path.into();
        }
        if let Some(path) = lookup("GANGWAY_TRUSTED_CA_PATH") {
            self.trusted_ca_path = Some(path.into());
        }
        if let Some(key) = lookup("GANGWAY_SESSION_SECURITY_KEY") {
            self.session_security_key = Some(key);
        }
        if let Some(scopes) = lookup("GANGWAY_SCOPES") {
            self.scopes = scopes
                .split(',')
                .map(str::trim)
                .filter(|scope| !scope.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = lookup("GANGWAY_ALLOW_EMPTY_CLIENT_SECRET") {
            self.allow_empty_client_secret =
                parse_bool("GANGWAY_ALLOW_EMPTY_CLIENT_SECRET", &value)?;
        }
        if let Some(value) = lookup("GANGWAY_REQUIRE_REFRESH_TOKEN") {
            self.require_refresh_token = parse_bool("GANGWAY_REQUIRE_REFRESH_TOKEN", &value)?;
        }
        Ok(())
    }

    /// Checks that every required value is present.
    pub fn validate(&self) -> Result<(), PortalError> {
        let required = [
            ("cluster_name", &self.cluster_name),
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("client_id", &self.client_id),
            ("redirect_url", &self.redirect_url),
            ("apiserver_url", &self.api_server_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(PortalError::MissingConfig(name));
            }
        }
        if self.client_secret.is_empty() && !self.allow_empty_client_secret {
            return Err(PortalError::EmptyClientSecret);
        }
        if !self.http_path.is_empty() && !self.http_path.starts_with('/') {
            return Err(PortalError::InvalidConfig(format!(
                "http_path must start with '/', got {:?}",
                self.http_path
            )));
        }
        Ok(())
    }

    /// Base path all routes are mounted under.
    pub fn root_path_prefix(&self) -> &str {
        if self.http_path.is_empty() {
            "/"
        } else {
            &self.http_path
        }
    }

    /// Where a successful callback sends the browser.
    pub fn commandline_path(&self) -> String {
        format!("{}/commandline", self.http_path.trim_end_matches('/'))
    }

    pub fn kubeconfig_path(&self) -> String {
        format!("{}/kubeconfig", self.http_path.trim_end_matches('/'))
    }
}
