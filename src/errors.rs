use openidconnect::reqwest;
use openidconnect::{HttpClientError, RequestTokenError};
use rocket::Request;
use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response::{self, Redirect, Responder};
use std::io::Cursor;
use thiserror::Error;

pub type TokenErr = RequestTokenError<
    HttpClientError<reqwest::Error>,
    openidconnect::StandardErrorResponse<openidconnect::core::CoreErrorResponseType>,
>;

/// Failures of the cookie session store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {name} could not be decoded: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("session {name} could not be encoded: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("session {name} is {len} bytes once encrypted, over the {max} byte cookie limit")]
    TooLarge { name: String, len: usize, max: usize },
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("IO Error: {0}")]
    IO(#[from] std::io::Error),
    #[error("configuration file error: {0}")]
    ConfigFile(#[source] serde_yaml::Error),
    #[error("missing required configuration value: {0}")]
    MissingConfig(&'static str),
    #[error("invalid configuration value: {0}")]
    InvalidConfig(String),
    #[error("client secret is empty and allow_empty_client_secret is not set")]
    EmptyClientSecret,

    #[error("url parsing error: {0}")]
    UrlErr(#[from] openidconnect::url::ParseError),
    #[error("reqwest error: {0}")]
    RequestErr(#[from] reqwest::Error),
    #[error("token exchange error: {0}")]
    TokenError(#[from] TokenErr),
    #[error("token response did not include an id_token")]
    MissingIdToken,

    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("state parameter does not match the session")]
    StateMismatch,

    #[error("could not parse id token: {0}")]
    InvalidIdToken(#[from] jsonwebtoken::errors::Error),
    #[error("missing username claim {0:?}")]
    MissingUsernameClaim(String),
    #[error("missing issuer claim")]
    MissingIssuerClaim,

    #[error("error creating kubeconfig: {0}")]
    Kubeconfig(#[source] serde_yaml::Error),

    /// The session did not hold usable tokens. The session has already been
    /// cleared; the response is a redirect to `redirect`.
    #[error("no authenticated session")]
    Unauthenticated { redirect: String },
}

impl PortalError {
    /// Status code and client facing message. Internal details stay in the log.
    pub fn status_and_body(&self) -> (Status, &'static str) {
        match self {
            PortalError::StateMismatch => (Status::Forbidden, Status::Forbidden.reason_lossy()),
            PortalError::InvalidIdToken(_) => (Status::InternalServerError, "Could not parse JWT"),
            PortalError::MissingUsernameClaim(_) => {
                (Status::InternalServerError, "Could not parse Username claim")
            }
            PortalError::MissingIssuerClaim => {
                (Status::InternalServerError, "Could not parse Issuer URL claim")
            }
            PortalError::Kubeconfig(_) => (Status::InternalServerError, "Error creating kubeconfig"),
            PortalError::Unauthenticated { .. } => {
                (Status::TemporaryRedirect, Status::TemporaryRedirect.reason_lossy())
            }
            _ => (
                Status::InternalServerError,
                Status::InternalServerError.reason_lossy(),
            ),
        }
    }
}

impl<'r> Responder<'r, 'static> for PortalError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        if let PortalError::Unauthenticated { redirect } = self {
            log::info!("no authenticated session, redirecting to {}", redirect);
            return Redirect::temporary(redirect).respond_to(request);
        }

        let (status, body) = self.status_and_body();
        match &self {
            PortalError::StateMismatch => log::warn!("rejecting callback: {}", self),
            PortalError::Kubeconfig(err) => log::error!("Error creating kubeconfig - {}", err),
            _ => log::error!("{} {}: {}", request.method(), request.uri(), self),
        }

        response::Response::build()
            .status(status)
            .header(ContentType::Plain)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}
