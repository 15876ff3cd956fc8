//! This module assembles the per request [`UserInfo`] from the session cookies
//! and provides the [`LoginRequired`] guard protecting authenticated pages.

use crate::PortalState;
use crate::config::ClusterRef;
use crate::errors::PortalError;
use crate::session::{ID_TOKEN_SESSION, REFRESH_TOKEN_SESSION, cleanup_all};
use rocket::Request;
use rocket::http::{CookieJar, Status};
use rocket::request::{FromRequest, Outcome};
use serde_derive::Serialize;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Everything needed to render the command-line page or a kubeconfig.
/// Rebuilt on every request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub cluster_name: String,
    pub username: String,
    pub kube_cfg_user: String,
    pub id_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub issuer_url: String,
    pub api_server_url: String,
    pub cluster_ca: Vec<u8>,
    pub http_path: String,
    pub clusters: Vec<ClusterRef>,
}

/// Reads the cluster CA bytes as stored on disk. Failures only cost the CA in
/// the output, so they are logged and yield nothing.
async fn read_cluster_ca(path: &Path) -> Vec<u8> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) => {
            log::error!("Failed to open CA file {}: {}", path.display(), err);
            return Vec::new();
        }
    };
    let mut contents = Vec::new();
    if let Err(err) = file.read_to_end(&mut contents).await {
        log::warn!("Could not read CA file {}: {}", path.display(), err);
        return Vec::new();
    }
    contents
}

/// Clears all sessions and yields the redirect-home error.
fn unauthenticated(state: &PortalState, jar: &CookieJar<'_>) -> PortalError {
    cleanup_all(state.sessions.as_ref(), jar);
    PortalError::Unauthenticated {
        redirect: state.config.root_path_prefix().to_string(),
    }
}

/// Builds the [`UserInfo`] for the current request.
///
/// A session without tokens is cleared and answered with a redirect home
/// ([`PortalError::Unauthenticated`]). Session read failures, unparseable
/// tokens and missing username or issuer claims are errors.
pub async fn generate_info(
    state: &PortalState,
    jar: &CookieJar<'_>,
) -> Result<UserInfo, PortalError> {
    let config = &state.config;
    let cluster_ca = read_cluster_ca(&config.cluster_ca_path).await;

    let id_session = state.sessions.get(jar, ID_TOKEN_SESSION)?;
    let refresh_session = state.sessions.get(jar, REFRESH_TOKEN_SESSION)?;

    let Some(id_token) = id_session.get_str("id_token") else {
        return Err(unauthenticated(state, jar));
    };

    let refresh_token = match refresh_session.get_str("refresh_token") {
        Some(token) => token.to_string(),
        None if !config.require_refresh_token => String::new(),
        None => return Err(unauthenticated(state, jar)),
    };

    let claims = state.verifier.parse(id_token)?;

    let username = claims
        .string(&config.username_claim)
        .ok_or_else(|| PortalError::MissingUsernameClaim(config.username_claim.clone()))?;
    let kube_cfg_user = format!("{}@{}", username, config.cluster_name);

    if !config.email_claim.is_empty() {
        log::warn!(
            "using the Email Claim config setting is deprecated. Kubeconfig users are named `UsernameClaim@ClusterName`. This field will be removed in a future version."
        );
    }

    let issuer_url = claims.issuer().ok_or(PortalError::MissingIssuerClaim)?;

    if config.client_secret.is_empty() {
        log::warn!(
            "Setting an empty Client Secret should only be done if you have no other option and is an inherent security risk."
        );
    }

    Ok(UserInfo {
        cluster_name: config.cluster_name.clone(),
        username: username.to_string(),
        kube_cfg_user,
        id_token: id_token.to_string(),
        refresh_token,
        client_id: config.client_id.clone(),
        client_secret: config.client_secret.clone(),
        issuer_url: issuer_url.to_string(),
        api_server_url: config.api_server_url.clone(),
        cluster_ca,
        http_path: config.http_path.clone(),
        clusters: config.clusters.clone(),
    })
}

/// Request guard for pages that need a logged in user.
///
/// Forwards with `401 Unauthorized` when the id-token session is unreadable
/// or holds no `id_token`; the 401 catcher turns that into a redirect home.
#[derive(Debug, Clone, Copy)]
pub struct LoginRequired;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for LoginRequired {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(state) = req.rocket().state::<PortalState>() else {
            log::error!("portal state is not managed");
            return Outcome::Error((Status::InternalServerError, ()));
        };

        match state.sessions.get(req.cookies(), ID_TOKEN_SESSION) {
            Ok(session) if session.contains("id_token") => Outcome::Success(LoginRequired),
            Ok(_) => Outcome::Forward(Status::Unauthorized),
            Err(err) => {
                log::warn!("id token session unreadable: {}", err);
                Outcome::Forward(Status::Unauthorized)
            }
        }
    }
}
