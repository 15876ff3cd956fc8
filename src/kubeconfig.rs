//! Kubeconfig (clientcmd v1) document types and generation.
use crate::auth::UserInfo;
use crate::errors::PortalError;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
    pub users: Vec<NamedAuthInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub server: String,
    #[serde(
        rename = "certificate-authority-data",
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "base64_bytes"
    )]
    pub certificate_authority_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub cluster: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedAuthInfo {
    pub name: String,
    pub user: AuthInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(rename = "auth-provider")]
    pub auth_provider: AuthProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProviderConfig {
    pub name: String,
    pub config: BTreeMap<String, String>,
}

/// `[]byte` fields travel as standard base64 strings.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(de::Error::custom)
    }
}

/// Builds the kubeconfig for an assembled user.
///
/// Every cluster gets the same CA data and its own context, all contexts
/// share the single `oidc` user named after `kube_cfg_user`.
pub fn generate_kubeconfig(info: &UserInfo) -> Config {
    let ca_data = &info.cluster_ca;

    // TODO: reference a CA file instead of inlining the same CA into every cluster.
    let clusters: Vec<NamedCluster> = info
        .clusters
        .iter()
        .map(|extra| (extra.name.as_str(), extra.server.as_str()))
        .chain(std::iter::once((
            info.cluster_name.as_str(),
            info.api_server_url.as_str(),
        )))
        .map(|(name, server)| NamedCluster {
            name: name.to_string(),
            cluster: Cluster {
                server: server.to_string(),
                certificate_authority_data: ca_data.clone(),
            },
        })
        .collect();

    let contexts = clusters
        .iter()
        .map(|named| NamedContext {
            name: named.name.clone(),
            context: Context {
                cluster: named.name.clone(),
                user: info.kube_cfg_user.clone(),
            },
        })
        .collect();

    let provider_config = BTreeMap::from([
        ("client-id".to_string(), info.client_id.clone()),
        ("client-secret".to_string(), info.client_secret.clone()),
        ("id-token".to_string(), info.id_token.clone()),
        ("idp-issuer-url".to_string(), info.issuer_url.clone()),
        ("refresh-token".to_string(), info.refresh_token.clone()),
    ]);

    Config {
        api_version: "v1".to_string(),
        kind: "Config".to_string(),
        preferences: BTreeMap::new(),
        clusters,
        contexts,
        current_context: info.cluster_name.clone(),
        users: vec![NamedAuthInfo {
            name: info.kube_cfg_user.clone(),
            user: AuthInfo {
                auth_provider: AuthProviderConfig {
                    name: "oidc".to_string(),
                    config: provider_config,
                },
            },
        }],
    }
}

pub fn to_yaml(config: &Config) -> Result<String, PortalError> {
    serde_yaml::to_string(config).map_err(PortalError::Kubeconfig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterRef;

    const CA: &str = "-----BEGIN CERTIFICATE-----\nMIIBdummy\n-----END CERTIFICATE-----\n";

    fn info() -> UserInfo {
        UserInfo {
            cluster_name: "prod".to_string(),
            username: "alice".to_string(),
            kube_cfg_user: "alice@prod".to_string(),
            id_token: "id.token.value".to_string(),
            refresh_token: "refresh-value".to_string(),
            client_id: "gangway".to_string(),
            client_secret: "s3cret".to_string(),
            issuer_url: "https://idp.example.com/".to_string(),
            api_server_url: "https://prod.example.com:6443".to_string(),
            cluster_ca: CA.as_bytes().to_vec(),
            http_path: String::new(),
            clusters: vec![
                ClusterRef {
                    name: "staging".to_string(),
                    server: "https://staging.example.com".to_string(),
                },
                ClusterRef {
                    name: "dev".to_string(),
                    server: "https://dev.example.com".to_string(),
                },
            ],
        }
    }

    #[test]
    fn one_user_and_context_per_cluster() {
        let config = generate_kubeconfig(&info());
        assert_eq!(config.current_context, "prod");
        assert_eq!(config.users.len(), 1);
        assert_eq!(config.users[0].name, "alice@prod");
        assert_eq!(config.clusters.len(), 3);
        assert_eq!(config.contexts.len(), 3);
        assert_eq!(config.clusters.last().map(|c| c.name.as_str()), Some("prod"));
        for (cluster, context) in config.clusters.iter().zip(&config.contexts) {
            assert_eq!(cluster.name, context.name);
            assert_eq!(context.context.cluster, cluster.name);
            assert_eq!(context.context.user, "alice@prod");
            assert_eq!(cluster.cluster.certificate_authority_data, CA.as_bytes());
        }
    }

    #[test]
    fn auth_provider_carries_oidc_credentials() {
        let config = generate_kubeconfig(&info());
        let provider = &config.users[0].user.auth_provider;
        assert_eq!(provider.name, "oidc");
        assert_eq!(provider.config["client-id"], "gangway");
        assert_eq!(provider.config["client-secret"], "s3cret");
        assert_eq!(provider.config["id-token"], "id.token.value");
        assert_eq!(provider.config["idp-issuer-url"], "https://idp.example.com/");
        assert_eq!(provider.config["refresh-token"], "refresh-value");
    }

    #[test]
    fn yaml_round_trip_keeps_servers_and_ca() {
        let config = generate_kubeconfig(&info());
        let yaml = to_yaml(&config).expect("serialize");
        assert!(yaml.contains("current-context: prod"));
        assert!(yaml.contains("certificate-authority-data:"));

        let parsed: Config = serde_yaml::from_str(&yaml).expect("parse");
        assert_eq!(parsed, config);
        let servers: Vec<_> = parsed.clusters.iter().map(|c| c.cluster.server.as_str()).collect();
        assert_eq!(
            servers,
            vec![
                "https://staging.example.com",
                "https://dev.example.com",
                "https://prod.example.com:6443"
            ]
        );
    }

    #[test]
    fn empty_ca_is_omitted() {
        let mut info = info();
        info.cluster_ca.clear();
        info.clusters.clear();
        let yaml = to_yaml(&generate_kubeconfig(&info)).expect("serialize");
        assert!(!yaml.contains("certificate-authority-data"));
        let parsed: Config = serde_yaml::from_str(&yaml).expect("parse");
        assert!(parsed.clusters[0].cluster.certificate_authority_data.is_empty());
    }
}
