use std::{env, fs, path::PathBuf, time::Duration};

use cookie::SameSite;
use dotenv::dotenv;
use http::Method;
use thiserror::Error;
use tracing::warn;

use crate::services::policy_service::path_matches;

pub const APP_NAME: &str = "axum-rest-boilerplate";

/// Default cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
/// Default cookie carrying the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
/// Default readable cookie carrying the CSRF token for the current access token.
pub const CSRF_TOKEN_COOKIE: &str = "csrf_token";
/// Default request header echoing the CSRF token.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

const DEFAULT_PER_PAGE: u32 = 10;
const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("failed reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub base_url: String,
    pub database_url: String,
    pub store_timeout: Duration,
    pub bcrypt_cost: u32,
    pub policy_path: Option<PathBuf>,
    pub jwt: JwtConfig,
    pub cookies: CookieConfig,
    pub csrf: CsrfConfig,
    pub pagination: PaginationConfig,
    pub admin: AdminConfig,
    pub oauth2: Option<OAuth2Config>,
    pub routes: RouteRules,
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub issuer: String,
    /// PEM encoded RSA private key.
    pub private_key: String,
    /// PEM encoded RSA public key.
    pub public_key: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
}

#[derive(Clone, Debug)]
pub struct CookieConfig {
    pub enabled: bool,
    pub access_token_name: String,
    pub refresh_token_name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSite,
}

#[derive(Clone, Debug)]
pub struct CsrfConfig {
    pub enabled: bool,
    pub secret_key: String,
    pub header_name: String,
    pub cookie_name: String,
}

#[derive(Clone, Copy, Debug)]
pub struct PaginationConfig {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: MAX_PER_PAGE,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AdminConfig {
    pub create: bool,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

/// A static table of path pattern to allowed methods.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    entries: Vec<(String, Vec<Method>)>,
}

impl RouteTable {
    pub fn new<P: Into<String>>(entries: impl IntoIterator<Item = (P, Vec<Method>)>) -> Self {
        Self {
            entries: entries.into_iter().map(|(p, m)| (p.into(), m)).collect(),
        }
    }

    pub fn contains(&self, path: &str, method: &Method) -> bool {
        self.entries
            .iter()
            .any(|(pattern, methods)| methods.contains(method) && path_matches(pattern, path))
    }
}

/// Routes that bypass token validation (`exempt`) or accept anonymous callers (`optional`).
#[derive(Clone, Debug)]
pub struct RouteRules {
    pub exempt: RouteTable,
    pub optional: RouteTable,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self {
            exempt: RouteTable::new([
                ("/", vec![Method::GET]),
                ("/healthz", vec![Method::GET]),
                ("/auth/signup", vec![Method::POST]),
                ("/auth/login", vec![Method::POST]),
                ("/auth/refresh", vec![Method::POST]),
                ("/oauth2/login", vec![Method::GET]),
                ("/oauth2/callback", vec![Method::GET]),
            ]),
            optional: RouteTable::new([("/users/:username", vec![Method::GET])]),
        }
    }
}

impl Config {
    /// Reads configuration from the environment (and `.env`, if present).
    ///
    /// | Variable                  | Default                              |
    /// |---------------------------|--------------------------------------|
    /// | `APP_BIND_ADDR`           | `127.0.0.1:1323`                     |
    /// | `APP_BASE_URL`            | `http://localhost:1323`              |
    /// | `DATABASE_URL`            | `sqlite:app.db?mode=rwc`             |
    /// | `STORE_TIMEOUT_SECS`      | `10`                                 |
    /// | `JWT_PRIVATE_KEY_PATH`    | `./keys/dev-private-key.pem`         |
    /// | `JWT_PUBLIC_KEY_PATH`     | `./keys/dev-public-key.pem`          |
    /// | `JWT_ACCESS_TOKEN_TTL_SECS` | `600`                              |
    /// | `JWT_REFRESH_TOKEN_TTL_SECS` | `2592000`                         |
    /// | `COOKIES_ENABLED`         | `true`                               |
    /// | `CSRF_ENABLED`            | `false`                              |
    /// | `CSRF_SECRET_KEY`         | required when CSRF is enabled        |
    /// | `ADMIN_CREATE`            | `false`                              |
    ///
    /// See `.env.example` for the full list.
    ///
    /// `/auth/refresh` is exempt from token and CSRF checks: the CSRF token is
    /// derived from the access cookie, which has usually expired by the time a
    /// refresh is needed. A cookie driven refresh is guarded by the refresh
    /// cookie's `SameSite` attribute alone.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let private_key_path = var_or("JWT_PRIVATE_KEY_PATH", "./keys/dev-private-key.pem");
        let public_key_path = var_or("JWT_PUBLIC_KEY_PATH", "./keys/dev-public-key.pem");

        let csrf_enabled = parse_var("CSRF_ENABLED", false)?;
        let csrf_secret_key = env::var("CSRF_SECRET_KEY").unwrap_or_default();
        if csrf_enabled && csrf_secret_key.is_empty() {
            return Err(ConfigError::Missing("CSRF_SECRET_KEY"));
        }

        let admin = AdminConfig {
            create: parse_var("ADMIN_CREATE", false)?,
            username: var_or("ADMIN_USERNAME", "admin"),
            email: var_or("ADMIN_EMAIL", "admin@example.com"),
            password: env::var("ADMIN_PASSWORD").unwrap_or_default(),
        };
        if admin.create && admin.password.is_empty() {
            return Err(ConfigError::Missing("ADMIN_PASSWORD"));
        }

        let config = Self {
            bind_addr: var_or("APP_BIND_ADDR", "127.0.0.1:1323"),
            base_url: var_or("APP_BASE_URL", "http://localhost:1323"),
            database_url: var_or("DATABASE_URL", "sqlite:app.db?mode=rwc"),
            store_timeout: Duration::from_secs(parse_var("STORE_TIMEOUT_SECS", 10)?),
            bcrypt_cost: parse_var("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            policy_path: env::var("POLICY_PATH").ok().map(PathBuf::from),
            jwt: JwtConfig {
                issuer: var_or("JWT_ISSUER", APP_NAME),
                private_key: read_file(private_key_path)?,
                public_key: read_file(public_key_path)?,
                access_token_ttl: chrono::Duration::seconds(parse_var(
                    "JWT_ACCESS_TOKEN_TTL_SECS",
                    600,
                )?),
                refresh_token_ttl: chrono::Duration::seconds(parse_var(
                    "JWT_REFRESH_TOKEN_TTL_SECS",
                    30 * 24 * 60 * 60,
                )?),
            },
            cookies: CookieConfig {
                enabled: parse_var("COOKIES_ENABLED", true)?,
                access_token_name: var_or("COOKIES_ACCESS_TOKEN_NAME", ACCESS_TOKEN_COOKIE),
                refresh_token_name: var_or("COOKIES_REFRESH_TOKEN_NAME", REFRESH_TOKEN_COOKIE),
                domain: env::var("COOKIES_DOMAIN").ok().filter(|d| !d.is_empty()),
                secure: parse_var("COOKIES_SECURE", true)?,
                same_site: parse_same_site(&var_or("COOKIES_SAME_SITE", "strict"))?,
            },
            csrf: CsrfConfig {
                enabled: csrf_enabled,
                secret_key: csrf_secret_key,
                header_name: var_or("CSRF_HEADER_NAME", CSRF_HEADER),
                cookie_name: var_or("CSRF_COOKIE_NAME", CSRF_TOKEN_COOKIE),
            },
            pagination: PaginationConfig {
                default_per_page: parse_var("PAGINATION_DEFAULT_PER_PAGE", DEFAULT_PER_PAGE)?,
                max_per_page: parse_var("PAGINATION_MAX_PER_PAGE", MAX_PER_PAGE)?,
            },
            admin,
            oauth2: oauth2_from_env(),
            routes: RouteRules::default(),
        };

        if config.cookies.enabled && !config.cookies.secure {
            warn!("auth cookies are not marked Secure");
        }
        if config.cookie_refresh_is_cross_site() {
            warn!("refresh cookie is SameSite=None; cookie refreshes are open to cross-site requests");
        }

        Ok(config)
    }

    /// True when the refresh cookie would be sent on cross-site requests.
    pub fn cookie_refresh_is_cross_site(&self) -> bool {
        self.cookies.enabled && self.cookies.same_site == SameSite::None
    }
}

fn oauth2_from_env() -> Option<OAuth2Config> {
    let client_id = env::var("OAUTH2_CLIENT_ID").ok().filter(|v| !v.is_empty())?;
    Some(OAuth2Config {
        client_id,
        client_secret: env::var("OAUTH2_CLIENT_SECRET").unwrap_or_default(),
        auth_url: var_or("OAUTH2_AUTH_URL", "https://github.com/login/oauth/authorize"),
        token_url: var_or("OAUTH2_TOKEN_URL", "https://github.com/login/oauth/access_token"),
        userinfo_url: var_or("OAUTH2_USERINFO_URL", "https://api.github.com/user"),
        redirect_url: var_or("OAUTH2_REDIRECT_URL", "http://localhost:1323/oauth2/callback"),
        scopes: var_or("OAUTH2_SCOPES", "read:user,user:email")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    })
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        _ => Ok(default),
    }
}

fn parse_same_site(value: &str) -> Result<SameSite, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Ok(SameSite::Strict),
        "lax" => Ok(SameSite::Lax),
        "none" => Ok(SameSite::None),
        _ => Err(ConfigError::Invalid {
            name: "COOKIES_SAME_SITE",
            value: value.to_string(),
        }),
    }
}

fn read_file(path: String) -> Result<String, ConfigError> {
    let path = PathBuf::from(path);
    fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })
}
