// Hosted language model clients

pub mod anthropic;
pub mod openai;
pub mod provider;

pub use provider::{LLMAdapter, LLM};
