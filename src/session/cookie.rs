//! Session cookie formatting.

use crate::config::Environment;

pub const SESSION_COOKIE: &str = "session_token";

/// Seven days.
pub const SESSION_MAX_AGE_SECS: i64 = 604_800;

/// `Set-Cookie` value for a session token. `Secure` is added outside
/// local and development environments.
pub fn session_cookie(token: &str, environment: Environment) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; Max-Age={SESSION_MAX_AGE_SECS}; HttpOnly; SameSite=Lax"
    );
    if !environment.is_local_or_dev() {
        cookie.push_str("; Secure");
    }
    cookie
}
