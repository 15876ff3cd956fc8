use crate::PortalState;
use crate::auth::{LoginRequired, generate_info};
use crate::client::generate_state;
use crate::errors::PortalError;
use crate::kubeconfig::{generate_kubeconfig, to_yaml};
use crate::pages;
use crate::session::{ID_TOKEN_SESSION, PRIMARY_SESSION, REFRESH_TOKEN_SESSION, cleanup_all};
use rocket::Responder;
use rocket::http::{CookieJar, Header};
use rocket::response::{Redirect, content::RawHtml};
use rocket::{Route, State};

/// Kubeconfig YAML marked for download.
#[derive(Responder)]
pub struct KubeconfigAttachment {
    body: String,
    disposition: Header<'static>,
}

#[get("/")]
pub fn home(portal: &State<PortalState>) -> RawHtml<String> {
    pages::home(&portal.config)
}

/// Starts the authorization code flow.
#[get("/login")]
pub fn login(jar: &CookieJar<'_>, portal: &State<PortalState>) -> Result<Redirect, PortalError> {
    let state = generate_state();

    let mut session = portal.sessions.get(jar, PRIMARY_SESSION)?;
    session.insert("state", state.clone());
    portal.sessions.save(jar, &session)?;

    let url = portal
        .exchanger
        .authorize_url(&state, &portal.config.audience);
    Ok(Redirect::temporary(url))
}

/// Completes the flow: checks `state`, exchanges `code` and stores the tokens.
#[get("/callback?<state>&<code>")]
pub async fn callback(
    jar: &CookieJar<'_>,
    portal: &State<PortalState>,
    state: Option<String>,
    code: Option<String>,
) -> Result<Redirect, PortalError> {
    let sessions = &portal.sessions;
    let mut session = sessions.get(jar, PRIMARY_SESSION)?;
    let mut id_session = sessions.get(jar, ID_TOKEN_SESSION)?;
    let mut refresh_session = sessions.get(jar, REFRESH_TOKEN_SESSION)?;

    match (state.as_deref(), session.get_str("state")) {
        (Some(received), Some(expected)) if received == expected => {}
        _ => return Err(PortalError::StateMismatch),
    }

    let tokens = portal
        .exchanger
        .exchange_code(code.as_deref().unwrap_or_default())
        .await?;

    id_session.insert("id_token", tokens.id_token);
    match tokens.refresh_token {
        Some(refresh_token) => refresh_session.insert("refresh_token", refresh_token),
        None => {
            log::info!("provider did not issue a refresh token");
            refresh_session.remove("refresh_token");
        }
    }
    // single use
    session.remove("state");

    sessions.save(jar, &session)?;
    sessions.save(jar, &id_session)?;
    sessions.save(jar, &refresh_session)?;

    Ok(Redirect::to(portal.config.commandline_path()))
}

#[get("/logout")]
pub fn logout(jar: &CookieJar<'_>, portal: &State<PortalState>) -> Redirect {
    cleanup_all(portal.sessions.as_ref(), jar);
    Redirect::temporary(portal.config.root_path_prefix().to_string())
}

#[post("/logout")]
pub fn logout_post(jar: &CookieJar<'_>, portal: &State<PortalState>) -> Redirect {
    logout(jar, portal)
}

#[get("/commandline")]
pub async fn commandline(
    _login: LoginRequired,
    jar: &CookieJar<'_>,
    portal: &State<PortalState>,
) -> Result<RawHtml<String>, PortalError> {
    let info = generate_info(portal, jar).await?;
    Ok(pages::commandline(&info, &portal.config))
}

#[get("/kubeconfig")]
pub async fn kubeconfig(
    _login: LoginRequired,
    jar: &CookieJar<'_>,
    portal: &State<PortalState>,
) -> Result<KubeconfigAttachment, PortalError> {
    let info = generate_info(portal, jar).await?;
    let body = to_yaml(&generate_kubeconfig(&info))?;

    Ok(KubeconfigAttachment {
        body,
        disposition: Header::new("Content-Disposition", "Attachment"),
    })
}

pub fn get_routes() -> Vec<Route> {
    routes![
        home,
        login,
        callback,
        logout,
        logout_post,
        commandline,
        kubeconfig
    ]
}
