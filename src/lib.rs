// Drug discovery research agent - concurrent multi-source search with LLM report synthesis

pub mod agents;
pub mod chat;
pub mod cli;
pub mod config;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod search; // arXiv, PubMed, ChEMBL, ClinicalTrials.gov, Google Scholar, Google Search
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
