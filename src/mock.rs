//! Test doubles: an in-memory repository-contents API and fake OAuth
//! providers. Each test builds its own [`MockRepo`]; nothing is global.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use tokio::net::TcpListener;

/// A write accepted by the fake API.
#[derive(Debug, Clone)]
pub struct Commit {
    pub path: String,
    pub message: String,
    pub branch: String,
    pub sha: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct RepoState {
    files: BTreeMap<String, Vec<u8>>,
    commits: Vec<Commit>,
    fail_reads: Option<u16>,
    fail_writes: Option<u16>,
    rewrite_after_read: Option<(String, Vec<u8>)>,
}

/// In-memory repository served over the contents API shape.
#[derive(Clone, Default)]
pub struct MockRepo {
    state: Arc<Mutex<RepoState>>,
}

impl MockRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.lock().files.insert(path.to_string(), content.into());
    }

    pub fn insert_json(&self, path: &str, value: &Value) {
        self.insert(path, serde_json::to_vec_pretty(value).unwrap());
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn read_json(&self, path: &str) -> Option<Value> {
        self.read(path).map(|b| serde_json::from_slice(&b).unwrap())
    }

    pub fn sha(&self, path: &str) -> Option<String> {
        self.read(path).map(|b| blob_sha(&b))
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.lock().commits.clone()
    }

    /// Answer every GET with `status`.
    pub fn fail_reads(&self, status: u16) {
        self.lock().fail_reads = Some(status);
    }

    /// Answer every PUT with `status`.
    pub fn fail_writes(&self, status: u16) {
        self.lock().fail_writes = Some(status);
    }

    /// Replace `path` with `content` right after it is next read, so the
    /// reader's version tag is stale by the time it writes.
    pub fn rewrite_after_next_read(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.lock().rewrite_after_read = Some((path.to_string(), content.into()));
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/repos/{owner}/{repo}/contents/{*path}",
                get(get_contents).put(put_contents),
            )
            .with_state(self.clone())
    }
}

/// Git blob hash, the version tag the real API hands out.
fn blob_sha(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Base64 wrapped at 60 columns like the real API.
fn wrapped_base64(content: &[u8]) -> String {
    let encoded = STANDARD.encode(content);
    let mut out = String::new();
    for chunk in encoded.as_bytes().chunks(60) {
        out.push_str(std::str::from_utf8(chunk).unwrap());
        out.push('\n');
    }
    out
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}

fn entry(path: &str, kind: &str, sha: String) -> Value {
    let name = path.rsplit('/').next().unwrap_or(path);
    let download_url = (kind == "file").then(|| format!("http://raw.invalid/{path}"));
    json!({
        "name": name,
        "path": path,
        "sha": sha,
        "type": kind,
        "download_url": download_url,
    })
}

async fn get_contents(
    State(repo): State<MockRepo>,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
) -> Response {
    let mut state = repo.lock();
    if let Some(code) = state.fail_reads {
        return error(status(code), "upstream unavailable");
    }
    if let Some(content) = state.files.get(&path) {
        let mut body = entry(&path, "file", blob_sha(content));
        body["encoding"] = json!("base64");
        body["size"] = json!(content.len());
        body["content"] = json!(wrapped_base64(content));
        if state
            .rewrite_after_read
            .as_ref()
            .is_some_and(|(target, _)| *target == path)
        {
            if let Some((target, replacement)) = state.rewrite_after_read.take() {
                state.files.insert(target, replacement);
            }
        }
        return Json(body).into_response();
    }
    let prefix = format!("{path}/");
    let mut children: BTreeMap<String, Value> = BTreeMap::new();
    for (key, content) in &state.files {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once('/') {
            Some((dir, _)) => {
                let child = format!("{prefix}{dir}");
                children
                    .entry(dir.to_string())
                    .or_insert_with(|| entry(&child, "dir", blob_sha(child.as_bytes())));
            }
            None => {
                children.insert(rest.to_string(), entry(key, "file", blob_sha(content)));
            }
        }
    }
    if children.is_empty() {
        return error(StatusCode::NOT_FOUND, "Not Found");
    }
    Json(Value::Array(children.into_values().collect())).into_response()
}

async fn put_contents(
    State(repo): State<MockRepo>,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = repo.lock();
    if let Some(code) = state.fail_writes {
        return error(status(code), "write refused");
    }
    let Some(encoded) = body["content"].as_str() else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "content is required");
    };
    let Ok(content) = STANDARD.decode(encoded) else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "content is not valid Base64");
    };
    let sha = body["sha"].as_str().map(str::to_string);
    let created = match (state.files.get(&path), &sha) {
        (Some(_), None) => {
            return error(StatusCode::UNPROCESSABLE_ENTITY, "\"sha\" wasn't supplied.");
        }
        (Some(current), Some(given)) if blob_sha(current) != *given => {
            return error(StatusCode::CONFLICT, &format!("{path} does not match {given}"));
        }
        (existing, _) => existing.is_none(),
    };
    let new_sha = blob_sha(&content);
    state.files.insert(path.clone(), content);
    state.commits.push(Commit {
        path: path.clone(),
        message: body["message"].as_str().unwrap_or_default().to_string(),
        branch: body["branch"].as_str().unwrap_or_default().to_string(),
        sha,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });
    let code = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (code, Json(json!({ "content": entry(&path, "file", new_sha) }))).into_response()
}

/// Fake Google and GitHub OAuth endpoints.
///
/// The code `bad` is refused by both providers. Google insists on a
/// `code_verifier`; GitHub returns a profile without name or email.
pub fn oauth_router() -> Router {
    Router::new()
        .route("/google/token", post(google_token))
        .route("/google/userinfo", get(google_userinfo))
        .route("/github/token", post(github_token))
        .route("/github/user", get(github_user))
}

async fn google_token(Form(form): Form<BTreeMap<String, String>>) -> Json<Value> {
    let ok = form.get("code").map(String::as_str) != Some("bad")
        && form.get("grant_type").map(String::as_str) == Some("authorization_code")
        && form.get("code_verifier").is_some_and(|v| !v.is_empty());
    if ok {
        Json(json!({ "access_token": "google-token", "token_type": "Bearer", "expires_in": 3599 }))
    } else {
        Json(json!({ "error": "invalid_grant", "error_description": "Bad Request" }))
    }
}

async fn google_userinfo(headers: HeaderMap) -> Response {
    if bearer(&headers) != Some("google-token") {
        return error(StatusCode::UNAUTHORIZED, "invalid token");
    }
    Json(json!({ "name": "Ana", "email": "ana@example.com", "picture": "https://img/ana.png" }))
        .into_response()
}

async fn github_token(
    headers: HeaderMap,
    Form(form): Form<BTreeMap<String, String>>,
) -> Response {
    let wants_json = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    if !wants_json {
        return (StatusCode::OK, "access_token=gh-token&token_type=bearer").into_response();
    }
    if form.get("code").map(String::as_str) == Some("bad") {
        return Json(json!({ "error": "bad_verification_code" })).into_response();
    }
    Json(json!({ "access_token": "gh-token", "token_type": "bearer", "scope": "" })).into_response()
}

async fn github_user(headers: HeaderMap) -> Response {
    if bearer(&headers) != Some("gh-token") {
        return error(StatusCode::UNAUTHORIZED, "Bad credentials");
    }
    Json(json!({ "login": "octocat", "name": null, "email": null })).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
