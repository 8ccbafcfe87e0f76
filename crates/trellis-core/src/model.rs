//! Language-model boundary
//!
//! The runtime consults a model through this trait and nothing else.
//! Concrete clients (HTTP providers, local models) and prompt templates
//! live outside the workspace; `trellis-runtime` ships a mock for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from model clients.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("model not available")]
    NotAvailable,
}

/// A request to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// System prompt (role/persona)
    pub system: String,
    /// Rendered turn prompt
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelRequest {
    /// A request with default settings.
    pub fn simple(prompt: impl Into<String>) -> Self {
        Self {
            system: "You are a helpful agent.".to_string(),
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// A model completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    /// Model identifier reported by the client
    pub model: String,
    pub tokens_used: Option<u32>,
}

/// The model boundary trait.
#[async_trait]
pub trait LanguageModel: Send + Sync + std::fmt::Debug {
    /// Client name
    fn name(&self) -> &str;

    /// Whether the client can currently serve requests
    async fn is_available(&self) -> bool;

    /// Generate a completion
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Model double for in-crate tests; always answers with an empty string.
    #[derive(Debug)]
    pub struct NullModel;

    #[async_trait]
    impl LanguageModel for NullModel {
        fn name(&self) -> &str {
            "null"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
            Ok(ModelResponse {
                content: String::new(),
                model: "null".to_string(),
                tokens_used: None,
            })
        }
    }
}
