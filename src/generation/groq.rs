use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{with_retry, GenerationError, GenerationParams, GenerativeBackend};
use crate::config::GroqConfig;

const PROVIDER: &str = "groq";

/// Chat-completions backend for Groq's OpenAI-compatible API.
#[derive(Clone)]
pub struct GroqGenerator {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    max_attempts: u32,
}

impl GroqGenerator {
    pub fn new(
        client: Client,
        config: &GroqConfig,
        api_key: String,
        max_attempts: u32,
    ) -> Result<Self, GenerationError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|err| {
            GenerationError::Configuration(format!(
                "invalid Groq endpoint {}: {}",
                config.endpoint, err
            ))
        })?;

        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingEnvironment("GROQ_API_KEY".into()));
        }

        info!(model = config.model.as_str(), "Groq text generation ready");

        Ok(Self {
            client,
            endpoint,
            api_key,
            model: config.model.clone(),
            max_attempts,
        })
    }

    async fn send_once(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let body = build_request(&self.model, prompt, params);

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| GenerationError::http(PROVIDER, err))?;

        let status = response.status();
        if status.is_success() {
            let payload: ChatResponse = response
                .json()
                .await
                .map_err(|err| GenerationError::response(PROVIDER, err.to_string()))?;
            if let Some(id) = payload.id.as_deref() {
                debug!(request_id = id, "Groq completion received");
            }
            return extract_text(payload)
                .ok_or_else(|| GenerationError::response(PROVIDER, "no choices in response"));
        }

        let body = response.json::<ErrorResponse>().await.unwrap_or_default();
        let message = body
            .error
            .and_then(|err| err.message)
            .unwrap_or_else(|| format!("Groq completion failed with status {status}"));

        Err(GenerationError::status(PROVIDER, status, message))
    }
}

#[async_trait]
impl GenerativeBackend for GroqGenerator {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        with_retry(PROVIDER, self.max_attempts, move || {
            self.send_once(prompt, params)
        })
        .await
    }
}

fn build_request<'a>(model: &'a str, prompt: &'a str, params: &GenerationParams) -> ChatRequest<'a> {
    // greedy decoding when sampling is off
    let (temperature, top_p) = if params.sampling {
        (params.temperature, params.top_p)
    } else {
        (0.0, None)
    };

    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        temperature,
        top_p,
        max_tokens: params.max_length,
        // OpenAI-style APIs take an additive penalty instead of a multiplier
        frequency_penalty: params
            .repetition_penalty
            .map(|penalty| (penalty - 1.0).clamp(-2.0, 2.0)),
    }
}

fn extract_text(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.and_then(|message| message.content))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize, Default)]
struct ChatResponse {
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_sampling_request() {
        let params = GenerationParams {
            temperature: 0.9,
            max_length: 64,
            top_p: Some(0.95),
            repetition_penalty: Some(1.2),
            sampling: true,
        };
        let request = build_request("llama-3.1-8b-instant", "Say hi", &params);
        let json = serde_json::to_value(&request).expect("serialize");

        assert_eq!(json["model"], "llama-3.1-8b-instant");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Say hi");
        assert_eq!(json["max_tokens"], 64);
        assert!((json["temperature"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert!((json["frequency_penalty"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn greedy_request_drops_top_p() {
        let mut params = GenerationParams::new(1.2, 40);
        params.top_p = Some(0.9);
        params.sampling = false;
        let json = serde_json::to_value(build_request("m", "p", &params)).expect("serialize");

        assert_eq!(json["temperature"], 0.0);
        assert!(json.get("top_p").is_none());
        assert!(json.get("frequency_penalty").is_none());
    }

    #[test]
    fn parses_chat_completion_response() {
        let payload = r#"{"id":"chatcmpl-1","choices":[{"index":0,"message":{"role":"assistant","content":"Opulence redefined."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(payload).expect("parse");
        assert_eq!(extract_text(parsed).as_deref(), Some("Opulence redefined."));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("parse");
        assert_eq!(extract_text(empty), None);
    }
}
