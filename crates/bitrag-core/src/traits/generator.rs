//! Answer generation trait.

use async_trait::async_trait;

use crate::error::Result;

/// Turns a fully rendered prompt into an answer.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}
