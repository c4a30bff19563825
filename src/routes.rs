use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use blob_store::{
    upload_idempotent,
    BlobError,
    ContentAddressedCache,
    ProviderRegistry,
    UploadOutcome,
    DEFAULT_CONTENT_TYPE,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::SeoConfig,
    http_objects::ApiError,
    transform::{cache_key, Transformer},
    upload::UploadState,
};

const CACHE_CONTROL: &str = "public, max-age=2592000";
const X_CACHE: &str = "x-cache";

#[derive(Clone)]
pub struct RouteState {
    pub registry: Arc<ProviderRegistry>,
    pub cache: Option<Arc<ContentAddressedCache>>,
    pub transformer: Arc<dyn Transformer>,
    pub seo: Option<SeoConfig>,
    pub upload: Option<UploadState>,
}

pub fn create_routes(route_state: RouteState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/robots.txt", get(robots))
        .route("/api/upload/{*file_name}", put(upload_blob))
        .route("/{*path}", get(fetch_blob))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(route_state)
}

async fn health() -> &'static str {
    "ok"
}

async fn index(State(state): State<RouteState>) -> Result<Response, ApiError> {
    let seo = state.seo.as_ref().ok_or_else(ApiError::not_found)?;
    Ok((
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, seo.host_name.clone())],
    )
        .into_response())
}

async fn robots(State(state): State<RouteState>) -> Result<Response, ApiError> {
    let seo = state.seo.as_ref().ok_or_else(ApiError::not_found)?;
    let body = format!(
        "User-agent: *\nAllow: /\n\nSitemap: {}\nHost: {}",
        seo.site_map, seo.host_name
    );
    Ok(([(header::CONTENT_TYPE, "text/plain")], body).into_response())
}

fn http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Serves a virtual path. With a query string (and the cache enabled) the
/// request is a transformation served through the content-addressed
/// cache.
async fn fetch_blob(
    State(state): State<RouteState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let virtual_path = format!("/{}", path);

    if let (Some(query), Some(cache)) = (query.filter(|q| !q.is_empty()), &state.cache) {
        return transformed(&state, cache, &virtual_path, &query).await;
    }

    let data = state.registry.fetch(&virtual_path).await?;
    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, data.content_type_or_default())
        .header(header::CACHE_CONTROL, CACHE_CONTROL);
    if let Some(last_modified) = &data.last_modified {
        response = response.header(header::LAST_MODIFIED, http_date(last_modified));
    }
    if let Some(size) = data.size_bytes {
        response = response.header(header::CONTENT_LENGTH, size);
    }
    response
        .body(Body::from_stream(data.body))
        .map_err(|e| ApiError::internal_error_str(&e.to_string()))
}

/// Write-once upload. Re-sending the stored bytes succeeds, different
/// bytes under an existing name conflict.
async fn upload_blob(
    State(state): State<RouteState>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let upload = state.upload.as_ref().ok_or_else(ApiError::not_found)?;
    if !upload.authorizer.authorize(&headers, &file_name) {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    let outcome = upload_idempotent(
        upload.backend.as_ref(),
        &upload.container,
        &file_name,
        body,
        content_type,
    )
    .await?;

    match outcome {
        UploadOutcome::Created => Ok(StatusCode::CREATED.into_response()),
        UploadOutcome::Identical => Ok(StatusCode::OK.into_response()),
        UploadOutcome::Differs => Err(ApiError::new(
            StatusCode::CONFLICT,
            "File already exists and it's different from the uploaded file.",
        )),
    }
}

async fn transformed(
    state: &RouteState,
    cache: &ContentAddressedCache,
    virtual_path: &str,
    query: &str,
) -> Result<Response, ApiError> {
    let key = cache_key(virtual_path, query);
    let result = cache
        .get_or_create(key.as_bytes(), move || async move {
            let source = state.registry.fetch(virtual_path).await?;
            let content_type = source.content_type_or_default().to_string();
            let bytes = source.read_bytes().await?;
            state
                .transformer
                .transform(bytes, &content_type, query)
                .await
                .map_err(|e| BlobError::Producer { source: e })
        })
        .await?;

    let content_type = HeaderValue::from_str(&result.content_type)
        .map_err(|e| ApiError::internal_error_str(&e.to_string()))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL)),
            (
                header::HeaderName::from_static(X_CACHE),
                HeaderValue::from_static(result.outcome.into()),
            ),
        ],
        result.bytes,
    )
        .into_response())
}
