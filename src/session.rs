//! Cookie backed sessions.
//!
//! The portal keeps three independent sessions per browser: the primary one
//! holding the login `state`, one holding the `id_token` and one holding the
//! `refresh_token`. They are created and cleared together.
use crate::errors::SessionError;
use rocket::http::{Cookie, CookieJar, SameSite};
use serde_json::{Map, Value};

pub const PRIMARY_SESSION: &str = "gangway";
pub const ID_TOKEN_SESSION: &str = "gangway_id_token";
pub const REFRESH_TOKEN_SESSION: &str = "gangway_refresh_token";

pub const ALL_SESSIONS: [&str; 3] = [PRIMARY_SESSION, ID_TOKEN_SESSION, REFRESH_TOKEN_SESSION];

/// A named bag of values loaded from (and saved back to) one cookie.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    name: String,
    values: Map<String, Value>,
}

impl Session {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            values: Map::new(),
        }
    }

    pub fn with_values(name: &str, values: Map<String, Value>) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Returns the value only when it is stored as a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// True when the key holds anything other than null.
    pub fn contains(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|value| !value.is_null())
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }
}

/// Storage for [`Session`]s scoped to a single request's cookies.
///
/// Handlers receive the store as managed state so tests can swap in fakes.
pub trait SessionStore: Send + Sync {
    /// Loads the named session, returning an empty one when none exists yet.
    fn get(&self, jar: &CookieJar<'_>, name: &str) -> Result<Session, SessionError>;

    fn save(&self, jar: &CookieJar<'_>, session: &Session) -> Result<(), SessionError>;

    /// Deletes the named session. Deleting an absent session is not an error.
    fn cleanup(&self, jar: &CookieJar<'_>, name: &str);
}

/// Clears the primary, id-token and refresh-token sessions.
pub fn cleanup_all(store: &dyn SessionStore, jar: &CookieJar<'_>) {
    for name in ALL_SESSIONS {
        store.cleanup(jar, name);
    }
}

/// Browsers silently drop cookies longer than this.
pub const MAX_COOKIE_SIZE: usize = 4096;

// Private cookies carry a 12 byte nonce and a 16 byte tag around the value.
const PRIVATE_COOKIE_OVERHEAD: usize = 12 + 16;

/// Length of `name=value` once `value` is sealed into a private cookie.
fn private_cookie_len(name: &str, value: &str) -> usize {
    let sealed = value.len() + PRIVATE_COOKIE_OVERHEAD;
    let encoded = base64::encoded_len(sealed, true).unwrap_or(usize::MAX);
    name.len().saturating_add(1).saturating_add(encoded)
}

/// Keeps each session JSON encoded inside a private (encrypted and
/// authenticated) Rocket cookie named after the session.
#[derive(Debug, Clone)]
pub struct CookieSessionStore {
    path: String,
    max_age: time::Duration,
}

impl Default for CookieSessionStore {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_age: time::Duration::days(7),
        }
    }
}

impl CookieSessionStore {
    pub fn new(path: &str, max_age: time::Duration) -> Self {
        Self {
            path: path.to_string(),
            max_age,
        }
    }
}

impl SessionStore for CookieSessionStore {
    fn get(&self, jar: &CookieJar<'_>, name: &str) -> Result<Session, SessionError> {
        let Some(cookie) = jar.get_private(name) else {
            return Ok(Session::new(name));
        };
        let values: Map<String, Value> =
            serde_json::from_str(cookie.value()).map_err(|source| SessionError::Decode {
                name: name.to_string(),
                source,
            })?;
        Ok(Session::with_values(name, values))
    }

    fn save(&self, jar: &CookieJar<'_>, session: &Session) -> Result<(), SessionError> {
        let encoded =
            serde_json::to_string(&session.values).map_err(|source| SessionError::Encode {
                name: session.name.clone(),
                source,
            })?;
        let len = private_cookie_len(&session.name, &encoded);
        if len > MAX_COOKIE_SIZE {
            return Err(SessionError::TooLarge {
                name: session.name.clone(),
                len,
                max: MAX_COOKIE_SIZE,
            });
        }
        let cookie = Cookie::build((session.name.clone(), encoded))
            .path(self.path.clone())
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(self.max_age);
        jar.add_private(cookie);
        Ok(())
    }

    fn cleanup(&self, jar: &CookieJar<'_>, name: &str) {
        jar.remove_private(Cookie::build((name.to_string(), "")).path(self.path.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_str_ignores_non_string_values() {
        let mut session = Session::new(ID_TOKEN_SESSION);
        session.insert("id_token", json!(42));
        assert_eq!(session.get_str("id_token"), None);
        assert!(session.contains("id_token"));

        session.insert("id_token", "abc");
        assert_eq!(session.get_str("id_token"), Some("abc"));
    }

    #[test]
    fn null_values_do_not_count_as_present() {
        let mut session = Session::new(REFRESH_TOKEN_SESSION);
        session.insert("refresh_token", Value::Null);
        assert!(!session.contains("refresh_token"));
        assert_eq!(session.remove("refresh_token"), Some(Value::Null));
        assert!(session.values().is_empty());
    }

    #[test]
    fn private_cookie_length_accounts_for_sealing() {
        // 4 + 28 bytes sealed -> 44 base64 characters
        assert_eq!(private_cookie_len("gangway", "abcd"), "gangway=".len() + 44);
        assert!(private_cookie_len(ID_TOKEN_SESSION, &"x".repeat(3100)) > MAX_COOKIE_SIZE);
        assert!(private_cookie_len(ID_TOKEN_SESSION, &"x".repeat(2000)) < MAX_COOKIE_SIZE);
    }
}
