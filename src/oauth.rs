//! OAuth authorization-code exchange for Google and GitHub.
//!
//! Stateless: the provider's access token and a normalised profile are
//! handed back to the browser, which keeps them. No session is created here.

use std::{fmt, str::FromStr};

use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::config::{OAuthSettings, ProviderSettings};

/// Stand-in address for GitHub accounts that keep their email private.
pub const GITHUB_EMAIL_FALLBACK: &str = "sem-email@github.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Github,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::Github),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Google => "Google",
            Provider::Github => "GitHub",
        })
    }
}

#[derive(Error, Debug)]
pub enum OAuthError {
    /// The provider answered without an access token.
    #[error("{provider} did not return an access token")]
    MissingToken { provider: Provider, details: Value },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Profile returned to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Result of a successful exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenExchange {
    pub access_token: String,
    pub user: UserProfile,
}

#[derive(Deserialize)]
struct GoogleUser {
    name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
}

#[derive(Deserialize)]
struct GithubUser {
    login: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

/// Exchanges authorization codes using server-held client credentials.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    settings: OAuthSettings,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, settings: OAuthSettings) -> Self {
        Self { http, settings }
    }

    /// Trade `code` for an access token, then fetch the user's profile.
    ///
    /// `code_verifier` is forwarded to Google (PKCE); GitHub ignores it.
    pub async fn exchange(
        &self,
        provider: Provider,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenExchange, OAuthError> {
        let exchange = match provider {
            Provider::Google => self.google(code, code_verifier.unwrap_or_default()).await?,
            Provider::Github => self.github(code).await?,
        };
        info!(%provider, "oauth code exchanged");
        Ok(exchange)
    }

    async fn google(&self, code: &str, code_verifier: &str) -> Result<TokenExchange, OAuthError> {
        let p = &self.settings.google;
        let form = [
            ("client_id", p.client_id.as_str()),
            ("client_secret", p.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];
        let token_data: Value = self
            .http
            .post(&p.token_url)
            .form(&form)
            .send()
            .await?
            .json()
            .await?;
        let access_token = access_token(Provider::Google, token_data)?;

        let user: GoogleUser = self
            .http
            .get(&p.user_url)
            .bearer_auth(&access_token)
            .send()
            .await?
            .json()
            .await?;
        Ok(TokenExchange {
            access_token,
            user: UserProfile {
                name: user.name,
                email: user.email,
                picture: user.picture,
            },
        })
    }

    async fn github(&self, code: &str) -> Result<TokenExchange, OAuthError> {
        let p: &ProviderSettings = &self.settings.github;
        let form = [
            ("client_id", p.client_id.as_str()),
            ("client_secret", p.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ];
        let token_data: Value = self
            .http
            .post(&p.token_url)
            .header(header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?
            .json()
            .await?;
        let access_token = access_token(Provider::Github, token_data)?;

        let user: GithubUser = self
            .http
            .get(&p.user_url)
            .bearer_auth(&access_token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?
            .json()
            .await?;
        Ok(TokenExchange {
            access_token,
            user: UserProfile {
                name: user.name.or(user.login),
                email: Some(
                    user.email
                        .unwrap_or_else(|| GITHUB_EMAIL_FALLBACK.to_string()),
                ),
                picture: None,
            },
        })
    }
}

fn access_token(provider: Provider, token_data: Value) -> Result<String, OAuthError> {
    match token_data.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(OAuthError::MissingToken {
            provider,
            details: token_data,
        }),
    }
}
