//! Client for the hosted repository-contents API used as the document store.
//!
//! Files are addressed by repository path. Reads hand back the decoded bytes
//! together with the blob `sha`, which callers pass back on update so the
//! remote side can reject writes based on a stale read.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::RepoSettings;

const API_VERSION: &str = "2022-11-28";
const MEDIA_TYPE: &str = "application/vnd.github+json";

#[derive(Error, Debug)]
pub enum ContentsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("contents API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("version conflict writing {path}: {body}")]
    Conflict { path: String, body: String },
    #[error("{0} is not a file")]
    NotAFile(String),
    #[error("{0} is not a directory")]
    NotADirectory(String),
    #[error("invalid base64 content: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid contents API url: {0}")]
    Url(String),
}

/// A file read from the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub content: Vec<u8>,
    /// Version tag to send back when updating this file.
    pub sha: String,
}

/// One item of a directory listing. Fields beyond the ones the board uses
/// are kept so listings can be served back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub sha: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DirEntry {
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }
}

/// Whatever lives at a repository path.
#[derive(Debug, Clone, PartialEq)]
pub enum Contents {
    File(RemoteFile),
    Dir(Vec<DirEntry>),
}

#[derive(Deserialize)]
struct FileBody {
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

/// Repository-contents API client bound to one repository and branch.
#[derive(Clone)]
pub struct ContentsClient {
    http: reqwest::Client,
    base: Url,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
}

impl ContentsClient {
    /// Create a client for the repository described by `settings`.
    pub fn new(http: reqwest::Client, settings: &RepoSettings) -> Result<Self, ContentsError> {
        let base = Url::parse(&settings.api_url)
            .map_err(|e| ContentsError::Url(format!("{}: {e}", settings.api_url)))?;
        if base.cannot_be_a_base() {
            return Err(ContentsError::Url(settings.api_url.clone()));
        }
        Ok(Self {
            http,
            base,
            owner: settings.owner.clone(),
            repo: settings.repo.clone(),
            branch: settings.branch.clone(),
            token: settings.token.clone(),
        })
    }

    /// Read a file. `None` when nothing exists at `path`.
    pub async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>, ContentsError> {
        match self.fetch(path).await? {
            Some(Contents::File(file)) => Ok(Some(file)),
            Some(Contents::Dir(_)) => Err(ContentsError::NotAFile(path.to_string())),
            None => Ok(None),
        }
    }

    /// List a directory. `None` when nothing exists at `path`.
    pub async fn list_dir(&self, path: &str) -> Result<Option<Vec<DirEntry>>, ContentsError> {
        match self.fetch(path).await? {
            Some(Contents::Dir(entries)) => Ok(Some(entries)),
            Some(Contents::File(_)) => Err(ContentsError::NotADirectory(path.to_string())),
            None => Ok(None),
        }
    }

    /// Read whatever lives at `path`, file or directory.
    pub async fn fetch(&self, path: &str) -> Result<Option<Contents>, ContentsError> {
        let resp = self.request(Method::GET, path)?.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(path, "nothing stored at path");
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ContentsError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value = resp.json().await?;
        if value.is_array() {
            let entries: Vec<DirEntry> = serde_json::from_value(value)?;
            return Ok(Some(Contents::Dir(entries)));
        }
        let body: FileBody = serde_json::from_value(value)?;
        let encoded = body
            .content
            .ok_or_else(|| ContentsError::NotAFile(path.to_string()))?;
        Ok(Some(Contents::File(RemoteFile {
            content: decode_content(&encoded)?,
            sha: body.sha,
        })))
    }

    /// Raw upstream JSON for `path`. Any non-2xx answer, including 404, is
    /// reported as [`ContentsError::Status`] with the upstream body.
    pub async fn fetch_json(&self, path: &str) -> Result<Value, ContentsError> {
        let resp = self.request(Method::GET, path)?.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ContentsError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    /// Create or update a file as a single commit.
    ///
    /// `sha` must be the version tag of the last read when the file already
    /// exists and `None` when creating it. A stale tag comes back as
    /// [`ContentsError::Conflict`]; nothing is retried.
    pub async fn put_file(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), ContentsError> {
        let body = PutBody {
            message,
            content: STANDARD.encode(content),
            branch: &self.branch,
            sha,
        };
        info!(path, message, update = sha.is_some(), "writing file");
        let resp = self.request(Method::PUT, path)?.json(&body).send().await?;
        let status = resp.status();
        if status == StatusCode::CONFLICT {
            let body = resp.text().await.unwrap_or_default();
            return Err(ContentsError::Conflict {
                path: path.to_string(),
                body,
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ContentsError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ContentsError> {
        let url = self.url(path)?;
        let req = self
            .http
            .request(method, url)
            .header(header::ACCEPT, MEDIA_TYPE)
            .header("X-GitHub-Api-Version", API_VERSION);
        Ok(match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    /// `{base}/repos/{owner}/{repo}/contents/{path}` with each path segment
    /// percent-encoded on its own.
    fn url(&self, path: &str) -> Result<Url, ContentsError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ContentsError::Url(self.base.to_string()))?;
            segments
                .pop_if_empty()
                .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }
}

/// The API wraps base64 content at 60 columns; strip whitespace first.
fn decode_content(encoded: &str) -> Result<Vec<u8>, ContentsError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}
