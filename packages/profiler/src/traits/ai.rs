//! Language model capability.
//!
//! One operation: a system/user prompt pair in, text plus usage accounting
//! out. Model selection is configuration; the pipeline records the model id
//! and token counts into the benchmark without interpreting them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProfileError, Result};

/// Completion request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model_id: "default".to_string(),
            max_tokens: 2048,
            temperature: 0.0,
        }
    }
}

impl CompletionOptions {
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A completion with its usage accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
}

/// LLM capability.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion>;
}

/// HTTP chat-completions client for OpenAI-compatible endpoints.
pub struct HttpLanguageModel {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    /// Cost per 1k input / output tokens, used to fill `cost_usd`.
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
}

impl HttpLanguageModel {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
        }
    }

    pub fn with_pricing(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.input_cost_per_1k = input_per_1k;
        self.output_cost_per_1k = output_per_1k;
        self
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            max_tokens: u32,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        #[derive(Deserialize, Default)]
        struct Usage {
            #[serde(default)]
            prompt_tokens: u32,
            #[serde(default)]
            completion_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
            #[serde(default)]
            usage: Usage,
        }

        debug!(model = %options.model_id, "Calling language model");
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&Request {
                model: &options.model_id,
                messages: vec![
                    Message { role: "system", content: system_prompt },
                    Message { role: "user", content: user_prompt },
                ],
                max_tokens: options.max_tokens,
                temperature: options.temperature,
            })
            .send()
            .await
            .map_err(|e| ProfileError::LanguageModel(Box::new(e)))?;

        if !response.status().is_success() {
            return Err(ProfileError::LanguageModel(Box::new(std::io::Error::other(
                format!("LLM API error: {}", response.status()),
            ))));
        }

        let parsed: Response = response
            .json()
            .await
            .map_err(|e| ProfileError::LanguageModel(Box::new(e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                ProfileError::LanguageModel(Box::new(std::io::Error::other("empty LLM response")))
            })?;

        let cost_usd = (parsed.usage.prompt_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (parsed.usage.completion_tokens as f64 / 1000.0) * self.output_cost_per_1k;

        Ok(Completion {
            text,
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
            cost_usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_options_builder() {
        let options = CompletionOptions::default()
            .with_model("profiler-extract-1")
            .with_max_tokens(512);
        assert_eq!(options.model_id, "profiler-extract-1");
        assert_eq!(options.max_tokens, 512);
    }
}
