/*!
Web portal that signs users in with an OpenID Connect provider and hands out
kubeconfig files whose user authenticates with the resulting ID and refresh
tokens.

```rust,ignore
use rocket::launch;
use rocket_kubeconfig::{PortalState, config::PortalConfig};

#[launch]
fn rocket() -> _ {
    let config = PortalConfig::from_env().unwrap();
    let state = PortalState::from_config(config).unwrap();
    rocket_kubeconfig::setup(rocket::build(), state)
}
```

Routes (relative to `http_path`):

| path | |
|---|---|
| `/` | home page |
| `/login` | redirects to the provider |
| `/callback` | completes the code exchange |
| `/logout` | clears the session |
| `/commandline` | kubectl instructions (login required) |
| `/kubeconfig` | kubeconfig download (login required) |
*/
#[macro_use]
extern crate rocket;

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod kubeconfig;
pub mod pages;
pub mod routes;
pub mod session;
pub mod token;

use client::{OIDCClient, TokenExchanger};
use config::PortalConfig;
use errors::PortalError;
use rocket::response::Redirect;
use rocket::{Build, Request, Rocket};
use session::{CookieSessionStore, SessionStore};
use std::sync::Arc;
use token::{IdTokenParser, TokenVerifier};

/// Shared, read-only dependencies of every handler.
pub struct PortalState {
    pub config: PortalConfig,
    pub sessions: Arc<dyn SessionStore>,
    pub exchanger: Arc<dyn TokenExchanger>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl PortalState {
    pub fn new(
        config: PortalConfig,
        sessions: Arc<dyn SessionStore>,
        exchanger: Arc<dyn TokenExchanger>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            config,
            sessions,
            exchanger,
            verifier,
        }
    }

    /// Wires the cookie session store, the openidconnect client and the
    /// jsonwebtoken based parser from a validated config.
    pub fn from_config(config: PortalConfig) -> Result<Self, PortalError> {
        config.validate()?;
        let exchanger = OIDCClient::from_config(&config)?;
        let verifier = IdTokenParser::new(&config.client_secret);
        Ok(Self::new(
            config,
            Arc::new(CookieSessionStore::default()),
            Arc::new(exchanger),
            Arc::new(verifier),
        ))
    }
}

#[catch(401)]
fn unauthorized(req: &Request<'_>) -> Redirect {
    let home = req
        .rocket()
        .state::<PortalState>()
        .map(|state| state.config.root_path_prefix().to_string())
        .unwrap_or_else(|| "/".to_string());
    Redirect::temporary(home)
}

/// Manages `state`, mounts the portal routes under its root prefix and
/// registers the catcher that sends unauthenticated users home.
pub fn setup(rocket: Rocket<Build>, state: PortalState) -> Rocket<Build> {
    let root = state.config.root_path_prefix().to_string();

    let rocket = match &state.config.session_security_key {
        Some(key) => {
            let figment = rocket.figment().clone().merge(("secret_key", key.clone()));
            rocket.configure(figment)
        }
        None => rocket,
    };

    log::info!(
        "serving kubeconfigs for cluster {} under {}",
        state.config.cluster_name,
        root
    );

    rocket
        .manage(state)
        .mount(root, routes::get_routes())
        .register("/", catchers![unauthorized])
}
