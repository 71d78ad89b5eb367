use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use nt_core::{ArticleCluster, ProcessedArticle, RawArticle, RawItem};
use nt_pipeline::{Outcome, ProcessingReport};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::AppState;

const BREAKING_WINDOW_HOURS: i64 = 24;
const BREAKING_SCAN_LIMIT: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Core(#[from] nt_core::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Core(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Core(nt_core::Error::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub source_id: String,
    #[serde(flatten)]
    pub item: RawItem,
}

#[derive(Debug, Default, Deserialize)]
pub struct IngestParams {
    #[serde(default)]
    pub process: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub raw_article_id: Uuid,
    pub report: Option<ProcessingReport>,
}

pub async fn ingest_raw_article(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IngestParams>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<impl IntoResponse> {
    let source = state
        .sources()
        .get(&request.source_id)
        .cloned()
        .ok_or_else(|| ApiError::BadRequest(format!("unknown source: {}", request.source_id)))?;

    let summary = state.ingestor.ingest(&source, vec![request.item]).await?;
    if summary.invalid > 0 {
        return Err(ApiError::BadRequest("invalid article URL".to_string()));
    }
    let raw_article_id = summary
        .created
        .first()
        .copied()
        .ok_or_else(|| ApiError::Conflict("article URL already ingested".to_string()))?;

    let report = if params.process {
        Some(state.processor.process(raw_article_id).await)
    } else {
        None
    };
    Ok((StatusCode::CREATED, Json(IngestResponse { raw_article_id, report })))
}

pub async fn process_raw_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let report = state.processor.process(id).await;
    let status = match report.outcome {
        Outcome::NotFound => StatusCode::NOT_FOUND,
        Outcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (status, Json(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SweepRequest {
    pub batch_size: usize,
    pub pace_ms: u64,
}

impl Default for SweepRequest {
    fn default() -> Self {
        Self {
            batch_size: 50,
            pace_ms: 0,
        }
    }
}

pub async fn sweep(
    State(state): State<Arc<AppState>>,
    request: Option<Json<SweepRequest>>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = request.unwrap_or_default();
    if request.batch_size == 0 {
        return Err(ApiError::BadRequest("batchSize must be positive".to_string()));
    }
    let summary = state
        .processor
        .sweep(request.batch_size, Duration::from_millis(request.pace_ms))
        .await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<ProcessedArticle>>> {
    let limit = params.limit.unwrap_or(20).min(200);
    Ok(Json(state.store().list_processed(limit).await?))
}

pub async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProcessedArticle>> {
    state
        .store()
        .get_processed(id)
        .await?
        .map(Json)
        .ok_or_else(|| nt_core::Error::not_found("processed article", id).into())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterView {
    #[serde(flatten)]
    pub cluster: ArticleCluster,
    pub members: Vec<RawArticle>,
}

pub async fn get_cluster(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ClusterView>> {
    let clusters = state.processor.clusters();
    let cluster = clusters
        .cluster(id)
        .await?
        .ok_or_else(|| nt_core::Error::not_found("cluster", id))?;
    let members = clusters.members_of(id).await?;
    Ok(Json(ClusterView { cluster, members }))
}

/// Breaking articles published within the last day, newest first.
pub async fn list_breaking(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<ProcessedArticle>>> {
    let since = Utc::now() - chrono::Duration::hours(BREAKING_WINDOW_HOURS);
    let mut articles: Vec<ProcessedArticle> = state
        .store()
        .list_processed(BREAKING_SCAN_LIMIT)
        .await?
        .into_iter()
        .filter(|a| a.is_breaking_news && a.published_at >= since)
        .collect();
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    Ok(Json(articles))
}
