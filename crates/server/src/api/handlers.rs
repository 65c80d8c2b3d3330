//! Search API handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};

use pansou_core::{ResultType, SearchError, SearchRequest, SearchResponse, SourceType};

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Query-string parameters of `GET /api/search`. List-valued fields arrive
/// comma-joined.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQueryParams {
    pub kw: Option<String>,
    pub channels: Option<String>,
    pub conc: Option<usize>,
    pub refresh: Option<bool>,
    pub res: Option<String>,
    pub src: Option<String>,
    pub plugins: Option<String>,
}

/// JSON body of `POST /api/search`. List-valued fields accept either a JSON
/// array or a comma-joined string.
#[derive(Debug, Default, Deserialize)]
pub struct SearchBody {
    pub kw: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub channels: Option<Vec<String>>,
    pub conc: Option<usize>,
    pub refresh: Option<bool>,
    pub res: Option<String>,
    pub src: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub plugins: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub plugins_enabled: bool,
    pub plugin_count: usize,
    pub channels: Vec<String>,
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        String(String),
        List(Vec<String>),
    }

    Ok(Option::<StringOrList>::deserialize(deserializer)?.map(|v| match v {
        StringOrList::String(s) => split_csv(&s),
        StringOrList::List(list) => list,
    }))
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

impl From<SearchQueryParams> for SearchBody {
    fn from(params: SearchQueryParams) -> Self {
        SearchBody {
            kw: params.kw,
            channels: params.channels.as_deref().map(split_csv),
            conc: params.conc,
            refresh: params.refresh,
            res: params.res,
            src: params.src,
            plugins: params.plugins.as_deref().map(split_csv),
        }
    }
}

impl SearchBody {
    fn into_request(self) -> SearchRequest {
        SearchRequest {
            keyword: self.kw.unwrap_or_default(),
            channels: self.channels.unwrap_or_default(),
            plugins: self.plugins.unwrap_or_default(),
            concurrency: self.conc.unwrap_or(0),
            force_refresh: self.refresh.unwrap_or(false),
            result_type: ResultType::from_param(self.res.as_deref().unwrap_or("")),
            source_type: SourceType::from_param(self.src.as_deref().unwrap_or("")),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/search
pub async fn search_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQueryParams>,
) -> (StatusCode, Json<ApiResponse<SearchResponse>>) {
    run_search(state, SearchBody::from(params)).await
}

/// POST /api/search
pub async fn search_post(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> (StatusCode, Json<ApiResponse<SearchResponse>>) {
    run_search(state, body).await
}

async fn run_search(
    state: Arc<AppState>,
    body: SearchBody,
) -> (StatusCode, Json<ApiResponse<SearchResponse>>) {
    match state.service().search(body.into_request()).await {
        Ok(response) => (
            StatusCode::OK,
            Json(ApiResponse {
                code: 0,
                message: "success".to_string(),
                data: Some(response),
            }),
        ),
        Err(SearchError::InvalidRequest(message)) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse {
                code: 400,
                message,
                data: None,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Search failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse {
                    code: 500,
                    message: "internal server error".to_string(),
                    data: None,
                }),
            )
        }
    }
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let service = state.service();
    Json(HealthResponse {
        status: "ok".to_string(),
        plugins_enabled: state.config().async_plugin.enabled,
        plugin_count: service.plugin_count(),
        channels: service.channel_names(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_csv() {
        assert_eq!(split_csv("a,b , c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv("a,,b"), vec!["a", "b"]);
        assert!(split_csv("").is_empty());
    }

    #[test]
    fn test_body_accepts_list_or_string() {
        let from_list: SearchBody =
            serde_json::from_str(r#"{"kw": "movie", "plugins": ["a", "b"]}"#).unwrap();
        assert_eq!(from_list.plugins, Some(vec!["a".to_string(), "b".to_string()]));

        let from_string: SearchBody =
            serde_json::from_str(r#"{"kw": "movie", "plugins": "a,b"}"#).unwrap();
        assert_eq!(
            from_string.plugins,
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_into_request_defaults() {
        let body: SearchBody = serde_json::from_str(r#"{"kw": "movie"}"#).unwrap();
        let request = body.into_request();

        assert_eq!(request.keyword, "movie");
        assert!(request.channels.is_empty());
        assert_eq!(request.concurrency, 0);
        assert!(!request.force_refresh);
        assert_eq!(request.result_type, ResultType::MergedByType);
        assert_eq!(request.source_type, SourceType::All);
    }

    #[test]
    fn test_into_request_selectors() {
        let body: SearchBody =
            serde_json::from_str(r#"{"kw": "movie", "res": "results", "src": "tg"}"#).unwrap();
        let request = body.into_request();

        assert_eq!(request.result_type, ResultType::Results);
        assert_eq!(request.source_type, SourceType::Tg);
    }
}
