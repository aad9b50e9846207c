//! LLM provider client.
//!
//! Calls an OpenAI-compatible chat-completions endpoint with the configured
//! provider/model/temperature/max_tokens. Provider failures are classified
//! by keyword so the 503 detail preserves observability signal (spec §4.3).

use rag_common::config::GenerationConfig;
use rag_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

const RAG_PROMPT_TEMPLATE: &str = "\nSYSTEM: You are a helpful and precise customer support assistant. Your goal is to answer the user's query based *only* on the provided context.\n- If the context contains the information needed to answer the query, provide a clear and concise answer citing the relevant information from the context.\n- If the context does not contain information relevant to the query, politely state that you don't have enough information based on the provided documents. Do not make up information or use external knowledge.\n- If the query is a greeting or conversational filler, respond politely as a support assistant.\n\nCONTEXT:\n{context}\n\nUSER QUERY:\n{query}\n\nASSISTANT RESPONSE:\n";

/// Joins context chunks per spec §4.3, or substitutes a placeholder if empty.
pub fn format_context(chunks: &[String]) -> String {
    if chunks.is_empty() {
        "No context provided.".to_string()
    } else {
        chunks.join("\n---\n")
    }
}

pub fn format_prompt(query: &str, chunks: &[String]) -> String {
    RAG_PROMPT_TEMPLATE
        .replace("{context}", &format_context(chunks))
        .replace("{query}", query)
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

pub struct LlmClient {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl LlmClient {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        if config.llm_provider != "openai" {
            return Err(AppError::Configuration {
                message: format!("Unsupported LLM provider: {}", config.llm_provider),
            });
        }
        if config.llm_api_key.is_none() {
            return Err(AppError::Configuration { message: "LLM_API_KEY is not configured.".to_string() });
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        match &self.config.llm_api_base {
            Some(base) => format!("{}/chat/completions", base.trim_end_matches('/')),
            None => "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }

    /// Formats the fixed prompt and invokes the chat-completions endpoint,
    /// returning the completion text or a classified 503.
    pub async fn generate_answer(&self, query: &str, context_chunks: &[String]) -> Result<String> {
        let prompt = format_prompt(query, context_chunks);

        let request = ChatCompletionRequest {
            model: self.config.llm_model_name.clone(),
            messages: vec![ChatMessage { role: "user".to_string(), content: prompt }],
            temperature: self.config.llm_temperature,
            max_tokens: self.config.llm_max_tokens,
        };

        let api_key = self.config.llm_api_key.as_deref().unwrap_or_default();

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_failure(&e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(&format!("LLM provider returned {status}: {body}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| classify_failure(&format!("failed to parse LLM response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| classify_failure("LLM provider returned no completion choices"))
    }
}

/// Maps a raw provider failure message to a 503, preserving the keywords
/// `rate limit`, `authentication`, and `timed out`/`timeout` when present
/// (spec §4.3's failure-classification contract).
fn classify_failure(message: &str) -> AppError {
    let lower = message.to_lowercase();
    let detail = if lower.contains("rate limit") {
        format!("Failed to get response from LLM: rate limit exceeded ({message})")
    } else if lower.contains("authentication") {
        format!("Failed to get response from LLM: authentication failed ({message})")
    } else if lower.contains("timed out") || lower.contains("timeout") {
        format!("Failed to get response from LLM: request timed out ({message})")
    } else {
        format!("Failed to get response from LLM: {message}")
    };
    AppError::upstream(axum::http::StatusCode::SERVICE_UNAVAILABLE, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_context_joins_with_separator() {
        let chunks = vec!["first".to_string(), "second".to_string()];
        assert_eq!(format_context(&chunks), "first\n---\nsecond");
    }

    #[test]
    fn format_context_empty_uses_placeholder() {
        assert_eq!(format_context(&[]), "No context provided.");
    }

    #[test]
    fn format_prompt_substitutes_both_variables() {
        let prompt = format_prompt("what is rust?", &["rust is a language".to_string()]);
        assert!(prompt.contains("CONTEXT:\nrust is a language"));
        assert!(prompt.contains("USER QUERY:\nwhat is rust?"));
        assert!(prompt.starts_with("\nSYSTEM: You are a helpful and precise customer support assistant."));
    }

    #[test]
    fn classify_failure_preserves_rate_limit_keyword() {
        let err = classify_failure("Rate limit exceeded, slow down");
        assert_eq!(err.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().to_lowercase().contains("rate limit"));
    }

    #[test]
    fn classify_failure_preserves_authentication_keyword() {
        let err = classify_failure("Authentication failed: invalid key");
        assert!(err.to_string().to_lowercase().contains("authentication"));
    }

    #[test]
    fn classify_failure_preserves_timeout_keyword() {
        let err = classify_failure("Request timed out after 30s");
        assert!(err.to_string().to_lowercase().contains("timed out"));
    }

    #[test]
    fn classify_failure_generic_appends_message() {
        let err = classify_failure("connection reset by peer");
        assert!(err.to_string().contains("connection reset by peer"));
    }
}
