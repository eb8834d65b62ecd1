// src/services/cookie_service.rs
use time::Duration;
use tower_cookies::{Cookie, Cookies, cookie::SameSite};

use crate::config::Config;

pub const OAUTH2_STATE_COOKIE: &str = "oauth2_state";
const OAUTH2_STATE_TTL: Duration = Duration::minutes(10);

/// Builds and clears the cookies carrying auth state.
#[derive(Clone, Debug)]
pub struct CookieService {
    enabled: bool,
    access_name: String,
    refresh_name: String,
    csrf_name: String,
    domain: Option<String>,
    secure: bool,
    same_site: SameSite,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl CookieService {
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.cookies.enabled,
            access_name: config.cookies.access_token_name.clone(),
            refresh_name: config.cookies.refresh_token_name.clone(),
            csrf_name: config.csrf.cookie_name.clone(),
            domain: config.cookies.domain.clone(),
            secure: config.cookies.secure,
            same_site: config.cookies.same_site,
            access_ttl: Duration::seconds(config.jwt.access_token_ttl.num_seconds()),
            refresh_ttl: Duration::seconds(config.jwt.refresh_token_ttl.num_seconds()),
        }
    }

    /* ---------- AUTH COOKIES ---------- */

    /// Sets the access and refresh cookies, plus the readable CSRF cookie
    /// when a CSRF token is supplied. No-op when cookie auth is disabled.
    pub fn set_auth_cookies(
        &self,
        cookies: &Cookies,
        access_token: &str,
        refresh_token: &str,
        csrf_token: Option<&str>,
    ) {
        if !self.enabled {
            return;
        }

        cookies.add(self.create_cookie(&self.access_name, access_token, self.access_ttl, true));
        cookies.add(self.create_cookie(&self.refresh_name, refresh_token, self.refresh_ttl, true));
        if let Some(csrf_token) = csrf_token {
            cookies.add(self.create_cookie(&self.csrf_name, csrf_token, self.access_ttl, false));
        }
    }

    pub fn clear_auth_cookies(&self, cookies: &Cookies) {
        if !self.enabled {
            return;
        }

        cookies.add(self.create_removal_cookie(&self.access_name, true));
        cookies.add(self.create_removal_cookie(&self.refresh_name, true));
        cookies.add(self.create_removal_cookie(&self.csrf_name, false));
    }

    pub fn refresh_token(&self, cookies: &Cookies) -> Option<String> {
        if !self.enabled {
            return None;
        }
        cookies
            .get(&self.refresh_name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    /* ---------- OAUTH2 STATE ---------- */

    /// The state cookie is always set: the provider round trip needs it even
    /// when cookie authentication is off. It is `Lax` so the provider's
    /// redirect back to the callback carries it.
    pub fn set_oauth2_state(&self, cookies: &Cookies, state: &str) {
        let mut cookie = self.create_cookie(OAUTH2_STATE_COOKIE, state, OAUTH2_STATE_TTL, true);
        cookie.set_same_site(SameSite::Lax);
        cookies.add(cookie);
    }

    /// Returns the stored state and clears it.
    pub fn take_oauth2_state(&self, cookies: &Cookies) -> Option<String> {
        let state = cookies
            .get(OAUTH2_STATE_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty());
        cookies.add(self.create_removal_cookie(OAUTH2_STATE_COOKIE, true));
        state
    }

    /* ---------- PRIVATE HELPERS ---------- */

    fn create_cookie(
        &self,
        name: &str,
        value: &str,
        max_age: Duration,
        http_only: bool,
    ) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_string(), value.to_string()))
            .secure(self.secure)
            .http_only(http_only)
            .same_site(self.same_site)
            .path("/")
            .max_age(max_age);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }

    fn create_removal_cookie(&self, name: &str, http_only: bool) -> Cookie<'static> {
        self.create_cookie(name, "", Duration::ZERO, http_only)
    }
}
