//! Generation capability trait.
//!
//! The generation call maps an assembled prompt to raw response text. The
//! core never retries: retry policy, streaming, and timeouts belong to the
//! implementation. Tests substitute scripted generators for deterministic
//! runs.

use async_trait::async_trait;

use crate::error::Result;

/// External prompt → raw text capability.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"deepseek-r1:70b"`).
    fn model_name(&self) -> &str;

    /// Generate a raw response for `prompt`.
    ///
    /// Failures and non-responses are reported as
    /// [`Error::Generation`](crate::Error::Generation).
    async fn generate(&self, prompt: &str) -> Result<String>;
}
