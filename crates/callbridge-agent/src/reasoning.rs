use crate::config::ReasoningConfig;
use crate::error::AgentError;
use async_trait::async_trait;
use callbridge_types::{AgentOutput, ChatMessage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Produces the next assistant output from the full conversation history.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn infer(&self, history: &[ChatMessage]) -> Result<AgentOutput, AgentError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// OpenAI-compatible chat completions with a strict JSON-schema response format.
#[derive(Debug, Clone)]
pub struct OpenAiReasoner {
    config: ReasoningConfig,
    client: reqwest::Client,
}

impl OpenAiReasoner {
    pub fn new(config: ReasoningConfig) -> Result<Self, AgentError> {
        if config.api_key.is_empty() {
            return Err(AgentError::Config(
                "OpenAI API key is not configured. Set OPENAI_API_KEY.".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn request_body(&self, history: &[ChatMessage]) -> Result<serde_json::Value, AgentError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: history,
            temperature: self.config.temperature,
            response_format: serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "agent_output",
                    "strict": true,
                    "schema": AgentOutput::json_schema(),
                }
            }),
        };
        serde_json::to_value(request)
            .map_err(|e| AgentError::Reasoning(format!("failed to encode request: {}", e)))
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiReasoner {
    async fn infer(&self, history: &[ChatMessage]) -> Result<AgentOutput, AgentError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(history)?)
            .send()
            .await
            .map_err(|e| AgentError::Reasoning(format!("request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AgentError::Reasoning(format!(
                "API error {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| AgentError::Reasoning(format!("response parse failed: {}", e)))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AgentError::Reasoning("response has no choices".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(AgentError::Reasoning(format!("model refused: {}", refusal)));
        }

        let output = AgentOutput::parse(message.content.as_deref().unwrap_or_default())?;
        tracing::debug!(
            query_knowledge = output.needs_knowledge_lookup,
            end_turn = output.turn_complete,
            "reasoning output received"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reasoner() -> OpenAiReasoner {
        OpenAiReasoner::new(ReasoningConfig {
            api_key: "sk-test".to_string(),
            ..ReasoningConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn missing_key_is_config_error() {
        let result = OpenAiReasoner::new(ReasoningConfig::default());
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[test]
    fn request_carries_history_and_schema() {
        let history = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let body = reasoner().request_body(&history).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["required"][1],
            "query_knowledge"
        );
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn choice_without_content_is_rejected() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        let content = parsed.choices[0].message.content.as_deref().unwrap_or_default();
        assert!(AgentOutput::parse(content).is_err());
    }
}
