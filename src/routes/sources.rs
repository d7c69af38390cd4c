use axum::{extract::State, routing::get, Json, Router};

use crate::models::{AppState, SourcesResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sources", get(list_sources))
        .with_state(state)
}

/// GET /api/sources - which data sources can answer right now
async fn list_sources(State(state): State<AppState>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.config.search.statuses(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::{body_json, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_default_sources() {
        let response = router(test_state())
            .oneshot(Request::builder().uri("/api/sources").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let sources = body["sources"].as_array().unwrap();
        assert_eq!(sources.len(), 6);
        assert_eq!(sources[0]["id"], "arxiv");
        assert_eq!(sources[0]["available"], true);
        // No credentials in the default configuration.
        assert_eq!(sources[4]["name"], "Google Scholar");
        assert_eq!(sources[4]["available"], false);
        assert_eq!(sources[5]["available"], false);
    }
}
