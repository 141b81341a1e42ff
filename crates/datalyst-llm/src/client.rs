use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use datalyst_core::config::ModelConfig;
use datalyst_core::error::{AnalystError, Result};
use datalyst_core::traits::Oracle;
use datalyst_core::types::OutputShape;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible oracle. Works with OpenAI, Ollama, vLLM, Groq,
/// OpenRouter, etc.
///
/// The workflow consumes complete responses, so requests are
/// non-streaming. Structured completions use the `response_format`
/// json_schema contract and are validated on receipt.
pub struct OpenAiOracle {
    http: Client,
    config: ModelConfig,
}

impl OpenAiOracle {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn completions_url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_API_BASE)
            .trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    async fn request(&self, prompt: &str, shape: Option<&OutputShape>) -> Result<String> {
        let body = ChatRequest {
            model: self.config.model_id.clone(),
            messages: vec![OaiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.config.max_tokens,
            // Always sent; the provider default is 1.0 and SQL generation
            // wants determinism.
            temperature: Some(self.config.temperature),
            stream: false,
            response_format: shape.map(|s| ResponseFormat {
                r#type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: s.name.clone(),
                    schema: s.schema.clone(),
                    strict: true,
                },
            }),
        };

        let mut req = self.http.post(self.completions_url()).json(&body);
        if let Some(api_key) = &self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let fut = async {
            let response = req
                .send()
                .await
                .map_err(|e| AnalystError::OracleRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(AnalystError::OracleRequest(format!(
                    "HTTP {}: {}",
                    status, body
                )));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| AnalystError::OracleParse(e.to_string()))?;

            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| AnalystError::OracleParse("response had no choices".into()))
        };

        match tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), fut).await {
            Ok(result) => result,
            Err(_) => Err(AnalystError::OracleTimeout(self.config.timeout_secs)),
        }
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct OaiMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    schema: serde_json::Value,
    strict: bool,
}

// Response types
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

/// Check a structured payload against the requested shape: must be a JSON
/// object carrying every key the schema marks as required.
pub fn validate_against_shape(value: &serde_json::Value, shape: &OutputShape) -> Result<()> {
    let obj = value.as_object().ok_or_else(|| {
        AnalystError::OracleParse(format!(
            "expected a JSON object for shape '{}', got: {}",
            shape.name, value
        ))
    })?;

    if let Some(required) = shape.schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !obj.contains_key(key) {
                return Err(AnalystError::OracleParse(format!(
                    "shape '{}' missing required field '{}'",
                    shape.name, key
                )));
            }
        }
    }

    Ok(())
}

impl Oracle for OpenAiOracle {
    fn complete(&self, prompt: &str) -> BoxFuture<'_, Result<String>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            debug!(chars = prompt.len(), "Oracle free-text completion");
            self.request(&prompt, None).await
        })
    }

    fn complete_structured(
        &self,
        prompt: &str,
        shape: &OutputShape,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        let prompt = prompt.to_string();
        let shape = shape.clone();
        Box::pin(async move {
            debug!(shape = %shape.name, "Oracle structured completion");
            let text = self.request(&prompt, Some(&shape)).await?;
            let value: serde_json::Value = serde_json::from_str(text.trim())
                .map_err(|e| AnalystError::OracleParse(format!("invalid JSON: {}", e)))?;
            validate_against_shape(&value, &shape)?;
            Ok(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent_shape() -> OutputShape {
        OutputShape::new(
            "router_verdict",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "intent": { "type": "string", "enum": ["database", "general"] }
                },
                "required": ["intent"]
            }),
        )
    }

    #[test]
    fn test_request_serialization_with_shape() {
        let body = ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![OaiMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            max_tokens: 1024,
            temperature: None,
            stream: false,
            response_format: Some(ResponseFormat {
                r#type: "json_schema".into(),
                json_schema: JsonSchemaFormat {
                    name: "router_verdict".into(),
                    schema: intent_shape().schema,
                    strict: true,
                },
            }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(
            json["response_format"]["json_schema"]["name"],
            "router_verdict"
        );
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"{\"intent\":\"database\"}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content,
            "{\"intent\":\"database\"}"
        );
    }

    #[test]
    fn test_validate_conforming() {
        let value = serde_json::json!({"intent": "database"});
        assert!(validate_against_shape(&value, &intent_shape()).is_ok());
    }

    #[test]
    fn test_validate_missing_field() {
        let value = serde_json::json!({"verdict": "database"});
        let err = validate_against_shape(&value, &intent_shape()).unwrap_err();
        assert!(matches!(err, AnalystError::OracleParse(_)));
    }

    #[test]
    fn test_validate_non_object() {
        let value = serde_json::json!("database");
        assert!(validate_against_shape(&value, &intent_shape()).is_err());
    }

    #[test]
    fn test_completions_url() {
        let mut config = ModelConfig {
            provider: "openai".into(),
            model_id: "gpt-4o-mini".into(),
            api_key: None,
            base_url: None,
            max_tokens: 4096,
            temperature: 0.0,
            timeout_secs: 60,
            retry: None,
        };
        let client = OpenAiOracle::new(config.clone());
        assert_eq!(
            client.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );

        config.base_url = Some("http://localhost:11434/v1/".into());
        let client = OpenAiOracle::new(config);
        assert_eq!(
            client.completions_url(),
            "http://localhost:11434/v1/chat/completions"
        );
    }
}
