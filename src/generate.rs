//! Answer generation over a completion service.
//!
//! [`AnswerGenerator`] builds the tutor prompts and sends exactly one
//! chat-completion request per query through the [`CompletionClient`]
//! seam. Sampling parameters are fixed at construction from
//! [`GenerationConfig`], so identical config produces identical requests.

use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::QueryError;

/// A black-box text-completion service.
///
/// One call sends a system instruction and a user message and returns the
/// completion text. Sampling configuration (model, temperature, maximum
/// output length) is part of the client, injected at construction.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, QueryError>;
}

/// Completion client backed by the OpenAI chat completions API.
///
/// Sends `POST /v1/chat/completions` with deterministic role separation:
/// one system message, one user message. No retries here; an upstream
/// failure surfaces immediately as
/// [`QueryError::GenerationUnavailable`] and the caller decides whether
/// the whole query is retried.
pub struct OpenAIChatClient {
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChatClient {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            client,
        })
    }

    async fn request_completion(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion_response(&json)
    }
}

#[async_trait]
impl CompletionClient for OpenAIChatClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, QueryError> {
        self.request_completion(system_prompt, user_prompt)
            .await
            .map_err(QueryError::GenerationUnavailable)
    }
}

/// Extract `choices[0].message.content`; zero completions is an error.
fn parse_completion_response(json: &serde_json::Value) -> anyhow::Result<String> {
    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow!("Invalid completion response: missing choices array"))?;

    let first = choices
        .first()
        .ok_or_else(|| anyhow!("Completion service returned zero choices"))?;

    first
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("Invalid completion response: missing message content"))
}

/// Builds tutor prompts and runs one completion per query.
pub struct AnswerGenerator {
    client: Arc<dyn CompletionClient>,
}

impl AnswerGenerator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Generate an answer to `question` from `context_block`, framing the
    /// assistant as a tutor for the document named `document_title`.
    pub async fn generate(
        &self,
        question: &str,
        context_block: &str,
        document_title: &str,
    ) -> Result<String, QueryError> {
        let system = system_prompt(document_title);
        let user = user_prompt(context_block, question);
        self.client.complete(&system, &user).await
    }
}

fn system_prompt(document_title: &str) -> String {
    format!(
        r#"You are a knowledgeable tutor with expertise in the subject matter covered in "{}".

Your task is to answer the student's question using the provided textbook context.

Guidelines:
1. Provide clear, direct answers based on the context provided
2. When relevant information is available, explain the concept thoroughly
3. Include page number citations when referencing specific information (e.g., "According to page 42...")
4. If the exact topic isn't covered in the provided context but you can make a reasonable inference from related content, do so confidently
5. If the question is completely outside the scope of the textbook, politely explain that this topic isn't covered in this particular textbook
6. Use clear, student-friendly language
7. Be confident in your explanations - avoid phrases like "the textbook doesn't explicitly say" or "it's not directly stated""#,
        document_title
    )
}

fn user_prompt(context_block: &str, question: &str) -> String {
    format!(
        r#"Context from textbook:
---
{}
---

Student question: {}

Please provide a helpful answer based on the context above."#,
        context_block, question
    )
}
