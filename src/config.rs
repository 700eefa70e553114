//! Configuration loading from `.env` files.
//!
//! List values such as `ALLOWED_ORIGINS` are comma separated. A list that
//! contains spaces must be quoted in the `.env` file.

use std::env;

use anyhow::{Context, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5174/auth/callback";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5174,https://academy.qway.com.br";

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP bind address, e.g. `127.0.0.1:4001`.
    pub bind_http: String,
    /// Repository used as the document store.
    pub contents: RepoSettings,
    /// OAuth client credentials and provider endpoints.
    pub oauth: OAuthSettings,
    /// Browser origins allowed by CORS.
    pub allowed_origins: Vec<String>,
}

/// Location of and credentials for the content repository.
#[derive(Debug, Clone)]
pub struct RepoSettings {
    /// Base URL of the contents API, e.g. `https://api.github.com`.
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    /// Branch every write is committed to.
    pub branch: String,
    /// Bearer token for the contents API.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// Redirect URI registered with both providers.
    pub redirect_uri: String,
    pub google: ProviderSettings,
    pub github: ProviderSettings,
}

/// Client credentials and endpoints of one identity provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub user_url: String,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let bind_http = env::var("BIND_HTTP").context("BIND_HTTP")?;
        let contents = RepoSettings {
            api_url: var_or("CONTENTS_API_URL", DEFAULT_API_URL),
            owner: env::var("CONTENTS_OWNER").context("CONTENTS_OWNER")?,
            repo: env::var("CONTENTS_REPO").context("CONTENTS_REPO")?,
            branch: var_or("CONTENTS_BRANCH", DEFAULT_BRANCH),
            token: env::var("GITHUB_TOKEN").ok().filter(|s| !s.is_empty()),
        };
        let oauth = OAuthSettings {
            redirect_uri: var_or("OAUTH_REDIRECT_URI", DEFAULT_REDIRECT_URI),
            google: ProviderSettings {
                client_id: var_or("GOOGLE_CLIENT_ID", ""),
                client_secret: var_or("GOOGLE_CLIENT_SECRET", ""),
                token_url: var_or("GOOGLE_TOKEN_URL", GOOGLE_TOKEN_URL),
                user_url: var_or("GOOGLE_USERINFO_URL", GOOGLE_USERINFO_URL),
            },
            github: ProviderSettings {
                client_id: var_or("GITHUB_CLIENT_ID", ""),
                client_secret: var_or("GITHUB_CLIENT_SECRET", ""),
                token_url: var_or("GITHUB_OAUTH_TOKEN_URL", GITHUB_TOKEN_URL),
                user_url: var_or("GITHUB_USER_URL", GITHUB_USER_URL),
            },
        };
        let allowed_origins = csv_strings(var_or("ALLOWED_ORIGINS", DEFAULT_ALLOWED_ORIGINS));
        Ok(Self {
            bind_http,
            contents,
            oauth,
            allowed_origins,
        })
    }
}

/// Value of `key`, or `default` when unset or empty.
fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    let s = input.as_ref();
    s.split(',')
        .filter_map(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .collect()
}

/// Every variable [`Settings::from_env`] reads.
#[cfg(test)]
pub const ENV_KEYS: &[&str] = &[
    "BIND_HTTP",
    "CONTENTS_API_URL",
    "CONTENTS_OWNER",
    "CONTENTS_REPO",
    "CONTENTS_BRANCH",
    "GITHUB_TOKEN",
    "OAUTH_REDIRECT_URI",
    "GOOGLE_CLIENT_ID",
    "GOOGLE_CLIENT_SECRET",
    "GOOGLE_TOKEN_URL",
    "GOOGLE_USERINFO_URL",
    "GITHUB_CLIENT_ID",
    "GITHUB_CLIENT_SECRET",
    "GITHUB_OAUTH_TOKEN_URL",
    "GITHUB_USER_URL",
    "ALLOWED_ORIGINS",
];

/// Serialises tests that touch the process environment.
#[cfg(test)]
pub static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Clear every settings variable; callers hold [`ENV_MUTEX`].
#[cfg(test)]
pub fn clear_env() {
    for key in ENV_KEYS {
        env::remove_var(key);
    }
}
