//! Mock model client for testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use trellis_core::{LanguageModel, ModelError, ModelRequest, ModelResponse};

/// A model double that cycles through canned responses. Lets the full
/// pipeline run in tests without any model access.
#[derive(Debug)]
pub struct MockModel {
    name: String,
    responses: Vec<String>,
    index: AtomicUsize,
}

impl MockModel {
    /// Cycle through the given responses.
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            name: "mock".to_string(),
            responses,
            index: AtomicUsize::new(0),
        }
    }

    /// Always return the same response.
    pub fn constant(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    /// How many requests this mock has served.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
        if self.responses.is_empty() {
            return Err(ModelError::NotAvailable);
        }
        let index = self.index.fetch_add(1, Ordering::SeqCst);
        Ok(ModelResponse {
            content: self.responses[index % self.responses.len()].clone(),
            model: self.name.clone(),
            tokens_used: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cycles_through_responses() {
        let mock = MockModel::new(vec!["one".into(), "two".into()]);
        let first = mock.generate(ModelRequest::simple("hi")).await.unwrap();
        let second = mock.generate(ModelRequest::simple("hi")).await.unwrap();
        let third = mock.generate(ModelRequest::simple("hi")).await.unwrap();
        assert_eq!(first.content, "one");
        assert_eq!(second.content, "two");
        assert_eq!(third.content, "one");
        assert_eq!(mock.calls(), 3);
    }
}
