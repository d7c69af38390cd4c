use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tracing::info;

use super::error_response;
use crate::models::{
    AppState, AuthorRequest, CitationRequest, NewsRequest, SearchRequest, SearchResponse, TextResponse,
};
use crate::search::{
    SearchAdapter, SourceId, UnconfiguredAdapter, SCHOLAR_SETTING, WEB_SEARCH_SETTING,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/search", post(aggregate_search))
        .route("/api/search/news", post(news_search))
        .route("/api/scholar/author", post(scholar_author))
        .route("/api/scholar/citations", post(scholar_citations))
        .with_state(state)
}

/// POST /api/search - aggregate search across the mode's sources, no report
async fn aggregate_search(State(state): State<AppState>, Json(request): Json<SearchRequest>) -> Response {
    if request.query.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Query is empty");
    }

    info!(query = %request.query, mode = %request.mode, "Received search request");
    let results = state
        .pipeline
        .search(&request.query, request.mode, request.max_results)
        .await;

    Json(SearchResponse {
        query: results.query.clone(),
        mode: request.mode,
        text: results.render(),
        sources: results.summaries(),
    })
    .into_response()
}

/// POST /api/search/news
async fn news_search(State(state): State<AppState>, Json(request): Json<NewsRequest>) -> Json<TextResponse> {
    let text = match &state.web {
        Some(web) => web.search_news(&request.query, request.max_results).await,
        None => {
            UnconfiguredAdapter::new(SourceId::GoogleSearch, WEB_SEARCH_SETTING)
                .search_text(&request.query, None)
                .await
        }
    };
    Json(TextResponse { text })
}

/// POST /api/scholar/author
async fn scholar_author(State(state): State<AppState>, Json(request): Json<AuthorRequest>) -> Json<TextResponse> {
    let text = match &state.scholar {
        Some(scholar) => scholar.search_author(&request.author, request.max_results).await,
        None => scholar_unavailable(&request.author).await,
    };
    Json(TextResponse { text })
}

/// POST /api/scholar/citations
async fn scholar_citations(State(state): State<AppState>, Json(request): Json<CitationRequest>) -> Json<TextResponse> {
    let text = match &state.scholar {
        Some(scholar) => scholar.search_citations(&request.title).await,
        None => scholar_unavailable(&request.title).await,
    };
    Json(TextResponse { text })
}

async fn scholar_unavailable(query: &str) -> String {
    UnconfiguredAdapter::new(SourceId::GoogleScholar, SCHOLAR_SETTING)
        .search_text(query, None)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::{body_json, json_request, test_state};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_aggregate_search() {
        let response = router(test_state())
            .oneshot(json_request(
                "POST",
                "/api/search",
                json!({"query": "KRAS inhibitors", "max_results": 2}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["mode"], "fast");
        let text = body["text"].as_str().unwrap();
        assert!(text.starts_with("=== Search results for \"KRAS inhibitors\" (up to 2 per source) ==="));
        let sources = body["sources"].as_array().unwrap();
        assert!(!sources.is_empty());
        assert!(sources.iter().all(|s| s["results"] == 2));
    }

    #[tokio::test]
    async fn test_aggregate_search_header_matches_served_count() {
        let response = router(test_state())
            .oneshot(json_request("POST", "/api/search", json!({"query": "KRAS", "max_results": 500})))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert!(body["text"]
            .as_str()
            .unwrap()
            .starts_with("=== Search results for \"KRAS\" (up to 20 per source) ==="));
        assert!(body["sources"].as_array().unwrap().iter().all(|s| s["results"] == 20));
    }

    #[tokio::test]
    async fn test_aggregate_search_rejects_empty_query() {
        let response = router(test_state())
            .oneshot(json_request("POST", "/api/search", json!({"query": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tools_report_missing_credentials() {
        let app = router(test_state());

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/search/news", json!({"query": "GLP-1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_json(response).await["text"].as_str().unwrap().to_string();
        assert!(text.contains("Google Search is not configured"));
        assert!(text.contains("GOOGLE_CSE_ID"));

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/scholar/author", json!({"author": "Frances Arnold"})))
            .await
            .unwrap();
        let text = body_json(response).await["text"].as_str().unwrap().to_string();
        assert!(text.contains("SERPAPI_API_KEY"));

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/scholar/citations",
                json!({"title": "Attention is all you need"}),
            ))
            .await
            .unwrap();
        let text = body_json(response).await["text"].as_str().unwrap().to_string();
        assert!(text.contains("Google Scholar is not configured"));
    }
}
