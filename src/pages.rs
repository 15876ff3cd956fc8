//! HTML pages served by the portal.
use crate::auth::UserInfo;
use crate::config::PortalConfig;
use rocket::http::RawStr;
use rocket::response::content::RawHtml;

/// Escapes values that come from tokens or configuration text. Paths are
/// validated at startup and inserted as is.
fn escape(value: &str) -> String {
    RawStr::new(value).html_escape().into_owned()
}

fn link(config: &PortalConfig, route: &str) -> String {
    format!("{}/{}", config.http_path.trim_end_matches('/'), route)
}

fn layout(title: &str, body: &str) -> RawHtml<String> {
    RawHtml(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape(title),
        body = body,
    ))
}

pub fn home(config: &PortalConfig) -> RawHtml<String> {
    let body = format!(
        r#"<h1>Kubernetes Authentication</h1>
<p>Sign in to get a kubeconfig for cluster <b>{cluster}</b>.</p>
<a href="{login}">Sign In</a>"#,
        cluster = escape(&config.cluster_name),
        login = link(config, "login"),
    );
    layout("Kubernetes Authentication", &body)
}

/// Wraps `value` in single quotes for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Shell commands that configure kubectl for `info`.
pub fn commandline_script(info: &UserInfo) -> String {
    let ca_file = shell_quote(&format!("ca-{}.pem", info.cluster_name));
    let cluster = shell_quote(&info.cluster_name);
    let user = shell_quote(&info.kube_cfg_user);
    let provider_arg = |key: &str, value: &str| {
        format!("--auth-provider-arg={}", shell_quote(&format!("{key}={value}")))
    };

    format!(
        r#"echo {ca} > {ca_file}
kubectl config set-cluster {cluster} --server={server} --certificate-authority={ca_file} --embed-certs
kubectl config set-credentials {user} \
    --auth-provider=oidc \
    {issuer} \
    {client_id} \
    {client_secret} \
    {refresh_token} \
    {id_token}
kubectl config set-context {cluster} --cluster={cluster} --user={user}
kubectl config use-context {cluster}
rm {ca_file}
"#,
        ca = shell_quote(String::from_utf8_lossy(&info.cluster_ca).trim_end()),
        server = shell_quote(&info.api_server_url),
        issuer = provider_arg("idp-issuer-url", &info.issuer_url),
        client_id = provider_arg("client-id", &info.client_id),
        client_secret = provider_arg("client-secret", &info.client_secret),
        refresh_token = provider_arg("refresh-token", &info.refresh_token),
        id_token = provider_arg("id-token", &info.id_token),
    )
}

pub fn commandline(info: &UserInfo, config: &PortalConfig) -> RawHtml<String> {
    let body = format!(
        r#"<h1>Welcome, {username}</h1>
<p>Download a <a href="{kubeconfig}">kubeconfig</a> for <b>{cluster}</b>, or paste the following into a terminal:</p>
<pre>{script}</pre>
<form method="post" action="{logout}"><button type="submit">Logout</button></form>"#,
        username = escape(&info.username),
        kubeconfig = config.kubeconfig_path(),
        cluster = escape(&info.cluster_name),
        script = escape(&commandline_script(info)),
        logout = link(config, "logout"),
    );
    layout("Kubernetes Authentication", &body)
}
