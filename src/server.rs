//! HTTP endpoints for the reference board, file passthrough and OAuth.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use crate::{
    board::Board,
    config::Settings,
    contents::{Contents, ContentsClient, ContentsError},
    error::AppError,
    model::{Comment, Natureza, Vote},
    oauth::{OAuthClient, Provider, TokenExchange},
};

/// Shared by every request; built once at startup.
pub struct HttpState {
    pub board: Board,
    pub oauth: OAuthClient,
    pub allowed_origins: Vec<String>,
}

impl HttpState {
    /// Build the contents and OAuth clients described by `cfg`, sharing one
    /// connection pool.
    pub fn from_settings(cfg: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("indica/", env!("CARGO_PKG_VERSION")))
            .build()?;
        if cfg.contents.token.is_none() {
            warn!("GITHUB_TOKEN not set, contents API requests are unauthenticated");
        }
        let contents = ContentsClient::new(http.clone(), &cfg.contents)?;
        Ok(Self {
            board: Board::new(contents),
            oauth: OAuthClient::new(http, cfg.oauth.clone()),
            allowed_origins: cfg.allowed_origins.clone(),
        })
    }
}

/// Response body for the `/healthz` endpoint.
#[derive(Serialize, Deserialize)]
struct Health {
    /// Always "ok" when the server is running.
    status: String,
}

/// Build the router with CORS restricted to the configured origins.
pub fn router(state: Arc<HttpState>) -> Router {
    let origins: Vec<HeaderValue> = state
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/{provider}/token", post(token_exchange))
        .route("/registrar-referencia", post(registrar_referencia))
        .route("/referencias", get(referencias))
        .route("/registrar-comentario", post(registrar_comentario))
        .route("/comentarios", get(comentarios))
        .route("/remover-comentario", delete(remover_comentario))
        .route("/registrar-voto", post(registrar_voto))
        .route("/votos", get(votos))
        .route("/remover-voto", post(remover_voto))
        .route("/conteudo-arquivo", get(conteudo_arquivo))
        .route("/listar-arquivos", get(listar_arquivos))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP API on `addr` and run until `shutdown` resolves.
pub async fn serve_http(
    addr: SocketAddr,
    state: Arc<HttpState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "http server listening");
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Health check endpoint.
async fn healthz() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

fn success() -> Json<Value> {
    Json(json!({ "sucesso": true }))
}

/// Empty strings count as missing.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn natureza(value: Option<&str>) -> Option<Natureza> {
    value.and_then(|s| s.parse().ok())
}

/// Unwrap a JSON body, turning any rejection into a 400 with `message`.
fn json_body<T>(body: Result<Json<T>, JsonRejection>, message: &str) -> Result<T, AppError> {
    body.map(|Json(v)| v).map_err(|rejection| {
        debug!(reason = %rejection.body_text(), "rejected request body");
        AppError::bad_request(message)
    })
}

#[derive(Deserialize)]
struct TokenRequest {
    code: Option<String>,
    code_verifier: Option<String>,
}

/// Exchange an authorization code with `provider`.
async fn token_exchange(
    State(state): State<Arc<HttpState>>,
    Path(provider): Path<String>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenExchange>, AppError> {
    let provider: Provider = provider
        .parse()
        .map_err(|_| AppError::bad_request("Provedor de autenticação inválido."))?;
    let req = json_body(body, "Requisição inválida")?;
    let code = present(req.code).ok_or_else(|| AppError::bad_request("Código ausente"))?;
    let verifier = present(req.code_verifier);
    let exchange = state
        .oauth
        .exchange(provider, &code, verifier.as_deref())
        .await
        .map_err(|e| AppError::from_oauth(e, provider))?;
    Ok(Json(exchange))
}

#[derive(Deserialize)]
struct ReferenceRequest {
    natureza: Option<String>,
    conteudo: Option<Value>,
}

async fn registrar_referencia(
    State(state): State<Arc<HttpState>>,
    body: Result<Json<ReferenceRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    const INVALID: &str = "Requisição inválida";
    let req = json_body(body, INVALID)?;
    let natureza = natureza(req.natureza.as_deref()).ok_or_else(|| AppError::bad_request(INVALID))?;
    let conteudo: Map<String, Value> = match req.conteudo {
        Some(Value::Object(map)) => map,
        _ => return Err(AppError::bad_request(INVALID)),
    };
    let id = state
        .board
        .register_reference(natureza, conteudo)
        .await
        .map_err(|e| AppError::from_board(e, "Erro ao registrar referência"))?;
    Ok(Json(json!({ "sucesso": true, "id": id })))
}

#[derive(Deserialize)]
struct NaturezaParams {
    natureza: Option<String>,
}

/// Stored references of one polarity.
async fn referencias(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<NaturezaParams>,
) -> Result<Response, AppError> {
    let natureza = natureza(params.natureza.as_deref())
        .ok_or_else(|| AppError::bad_request("Parâmetro natureza inválido"))?;
    let references = state
        .board
        .references(natureza)
        .await
        .map_err(|e| AppError::from_board(e, "Erro ao buscar referências"))?;
    Ok(Json(references).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceParams {
    referencia_id: Option<String>,
    natureza: Option<String>,
}

impl ReferenceParams {
    fn validate(self) -> Result<(String, Natureza), AppError> {
        let message = "Parâmetros referenciaId e natureza são obrigatórios.";
        let id = present(self.referencia_id).ok_or_else(|| AppError::bad_request(message))?;
        let natureza =
            natureza(self.natureza.as_deref()).ok_or_else(|| AppError::bad_request(message))?;
        Ok((id, natureza))
    }
}

#[derive(Deserialize)]
struct CommentInput {
    autor: Option<String>,
    texto: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRequest {
    referencia_id: Option<String>,
    natureza: Option<String>,
    comentario: Option<CommentInput>,
}

async fn registrar_comentario(
    State(state): State<Arc<HttpState>>,
    body: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    const INVALID: &str = "Campos obrigatórios ausentes ou inválidos";
    let req = json_body(body, INVALID)?;
    let id = present(req.referencia_id).ok_or_else(|| AppError::bad_request(INVALID))?;
    let natureza = natureza(req.natureza.as_deref()).ok_or_else(|| AppError::bad_request(INVALID))?;
    let input = req.comentario.ok_or_else(|| AppError::bad_request(INVALID))?;
    let (Some(texto), Some(email)) = (present(input.texto), present(input.email)) else {
        return Err(AppError::bad_request(INVALID));
    };
    state
        .board
        .register_comment(&id, natureza, Comment::new(input.autor, texto, email))
        .await
        .map_err(|e| AppError::from_board(e, "Erro ao registrar comentário"))?;
    Ok(success())
}

/// Comments on a reference; `[]` when there are none yet.
async fn comentarios(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<ReferenceParams>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let (id, natureza) = params.validate()?;
    let comments = state
        .board
        .comments(&id, natureza)
        .await
        .map_err(|e| AppError::from_board(e, "Erro ao buscar comentários"))?;
    Ok(Json(comments))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveCommentRequest {
    referencia_id: Option<String>,
    natureza: Option<String>,
    comentario_index: Option<i64>,
    email: Option<String>,
}

async fn remover_comentario(
    State(state): State<Arc<HttpState>>,
    body: Result<Json<RemoveCommentRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    const INVALID: &str = "Parâmetros obrigatórios ausentes ou inválidos";
    let req = json_body(body, INVALID)?;
    let id = present(req.referencia_id).ok_or_else(|| AppError::bad_request(INVALID))?;
    let natureza = natureza(req.natureza.as_deref()).ok_or_else(|| AppError::bad_request(INVALID))?;
    let index = req
        .comentario_index
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| AppError::bad_request(INVALID))?;
    let email = present(req.email).ok_or_else(|| AppError::bad_request(INVALID))?;
    state
        .board
        .remove_comment(&id, natureza, index, &email)
        .await
        .map_err(|e| AppError::from_board(e, "Erro ao remover comentário"))?;
    Ok(success())
}

#[derive(Deserialize)]
struct VoteInput {
    email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteRequest {
    referencia_id: Option<String>,
    natureza: Option<String>,
    voto: Option<VoteInput>,
}

async fn registrar_voto(
    State(state): State<Arc<HttpState>>,
    body: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    const MISSING: &str = "Campos obrigatórios ausentes";
    let req = json_body(body, MISSING)?;
    let id = present(req.referencia_id).ok_or_else(|| AppError::bad_request(MISSING))?;
    let natureza = natureza(req.natureza.as_deref()).ok_or_else(|| AppError::bad_request(MISSING))?;
    let email = present(req.voto.and_then(|v| v.email))
        .ok_or_else(|| AppError::bad_request(MISSING))?;
    state
        .board
        .register_vote(&id, natureza, Vote::new(email))
        .await
        .map_err(|e| AppError::from_board(e, "Erro ao registrar voto"))?;
    Ok(success())
}

/// Votes on a reference; `[]` when there are none yet.
async fn votos(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<ReferenceParams>,
) -> Result<Json<Vec<Vote>>, AppError> {
    let (id, natureza) = params.validate()?;
    let votes = state
        .board
        .votes(&id, natureza)
        .await
        .map_err(|e| AppError::from_board(e, "Erro ao buscar votos"))?;
    Ok(Json(votes))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveVoteRequest {
    referencia_id: Option<String>,
    email: Option<String>,
}

/// The polarity is taken from the id prefix; the request carries none.
async fn remover_voto(
    State(state): State<Arc<HttpState>>,
    body: Result<Json<RemoveVoteRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    const MISSING: &str = "Campos obrigatórios ausentes";
    let req = json_body(body, MISSING)?;
    let id = present(req.referencia_id).ok_or_else(|| AppError::bad_request(MISSING))?;
    let email = present(req.email).ok_or_else(|| AppError::bad_request(MISSING))?;
    state
        .board
        .remove_vote(&id, Natureza::from_reference_id(&id), &email)
        .await
        .map_err(|e| AppError::from_board(e, "Erro ao remover voto"))?;
    Ok(success())
}

#[derive(Deserialize)]
struct PathParams {
    path: Option<String>,
}

/// Decoded file content, or the listing when `path` is a directory.
async fn conteudo_arquivo(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<PathParams>,
) -> Result<Response, AppError> {
    let path = present(params.path).ok_or_else(|| AppError::bad_request("Caminho inválido"))?;
    match state.board.contents().fetch(&path).await {
        Ok(Some(Contents::File(file))) => {
            Ok(([(header::CONTENT_TYPE, "application/json")], file.content).into_response())
        }
        Ok(Some(Contents::Dir(entries))) => Ok(Json(entries).into_response()),
        Ok(None) => Err(AppError::NotFound("Arquivo não encontrado".into())),
        Err(e @ ContentsError::NotAFile(_)) => {
            Err(AppError::internal("Formato de conteúdo inesperado", e))
        }
        Err(e) => Err(AppError::from_contents(
            e,
            "Erro ao buscar conteúdo do arquivo",
        )),
    }
}

/// Raw upstream directory listing; upstream error statuses are relayed.
async fn listar_arquivos(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<PathParams>,
) -> Result<Json<Value>, AppError> {
    const INVALID: &str = "Parâmetro path é obrigatório e deve ser uma string válida";
    let raw = present(params.path).ok_or_else(|| AppError::bad_request(INVALID))?;
    // Callers may encode the path a second time on top of the query encoding.
    let path = percent_decode_str(&raw)
        .decode_utf8()
        .map_err(|_| AppError::bad_request(INVALID))?;
    match state.board.contents().fetch_json(&path).await {
        Ok(listing) => Ok(Json(listing)),
        Err(ContentsError::Status { status, body }) => Err(AppError::Upstream {
            status: axum::http::StatusCode::from_u16(status)
                .unwrap_or(axum::http::StatusCode::BAD_GATEWAY),
            message: "Erro ao buscar diretório".into(),
            details: body,
        }),
        Err(e) => Err(AppError::from_contents(e, "Erro ao listar arquivos")),
    }
}
