use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    with_retry, EncodedImage, GenerationError, GenerationParams, GenerativeBackend,
    VisionCaptioner,
};
use crate::config::GeminiConfig;

const PROVIDER: &str = "gemini";

const VISION_INSTRUCTION: &str = "You are a product cataloguer for a fashion store. \
Describe the product in this photo in one short, factual sentence naming its colour, \
type and intended wearer, for example: \"A red dress for women.\" \
Return only the sentence.";

const VISION_MAX_TOKENS: u32 = 48;

/// Gemini `generateContent` backend; also describes product photos.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    text_endpoint: Url,
    vision_endpoint: Url,
    api_key: String,
    max_attempts: u32,
}

impl GeminiGenerator {
    pub fn new(
        client: Client,
        config: &GeminiConfig,
        api_key: String,
        max_attempts: u32,
    ) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingEnvironment("GEMINI_API_KEY".into()));
        }

        let text_endpoint = model_endpoint(&config.endpoint, &config.model)?;
        let vision_endpoint = model_endpoint(&config.endpoint, &config.vision_model)?;

        info!(
            model = config.model.as_str(),
            vision_model = config.vision_model.as_str(),
            "Gemini generation ready"
        );

        Ok(Self {
            client,
            text_endpoint,
            vision_endpoint,
            api_key,
            max_attempts,
        })
    }

    async fn send_once(
        &self,
        endpoint: &Url,
        body: &GeminiRequest<'_>,
    ) -> Result<String, GenerationError> {
        let mut url = endpoint.clone();
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| GenerationError::http(PROVIDER, err))?;

        let status = response.status();
        if status.is_success() {
            let payload: GeminiResponse = response
                .json()
                .await
                .map_err(|err| GenerationError::response(PROVIDER, err.to_string()))?;
            return extract_text(payload)
                .ok_or_else(|| GenerationError::response(PROVIDER, "no text candidates"));
        }

        let body = response
            .json::<GeminiErrorResponse>()
            .await
            .unwrap_or_default();
        let message = body
            .error
            .and_then(|err| err.message)
            .unwrap_or_else(|| format!("Gemini request failed with status {status}"));

        Err(GenerationError::status(PROVIDER, status, message))
    }
}

#[async_trait]
impl GenerativeBackend for GeminiGenerator {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let body = text_request(prompt, params);
        let endpoint = &self.text_endpoint;
        let body = &body;
        with_retry(PROVIDER, self.max_attempts, move || {
            self.send_once(endpoint, body)
        })
        .await
    }
}

#[async_trait]
impl VisionCaptioner for GeminiGenerator {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn describe(&self, image: &EncodedImage) -> Result<String, GenerationError> {
        let data = image.to_base64();
        let body = vision_request(image.mime_type(), &data);
        let endpoint = &self.vision_endpoint;
        let body = &body;
        let text = with_retry(PROVIDER, self.max_attempts, move || {
            self.send_once(endpoint, body)
        })
        .await?;

        let description = text.trim().trim_matches('"').trim().to_string();
        if description.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(description)
    }
}

fn model_endpoint(base: &str, model: &str) -> Result<Url, GenerationError> {
    let trimmed = base.trim_end_matches('/');
    Url::parse(&format!("{}/{}:generateContent", trimmed, model)).map_err(|err| {
        GenerationError::Configuration(format!("invalid Gemini endpoint {}: {}", base, err))
    })
}

fn text_request<'a>(prompt: &'a str, params: &GenerationParams) -> GeminiRequest<'a> {
    let (temperature, top_p) = if params.sampling {
        (params.temperature, params.top_p)
    } else {
        (0.0, None)
    };

    GeminiRequest {
        contents: vec![GeminiContent {
            role: "user",
            parts: vec![GeminiPart::Text { text: prompt }],
        }],
        generation_config: GenerationConfig {
            temperature,
            top_p,
            max_output_tokens: params.max_length,
            frequency_penalty: params
                .repetition_penalty
                .map(|penalty| (penalty - 1.0).clamp(-2.0, 2.0)),
        },
    }
}

fn vision_request<'a>(mime_type: &'a str, data: &'a str) -> GeminiRequest<'a> {
    GeminiRequest {
        contents: vec![GeminiContent {
            role: "user",
            parts: vec![
                GeminiPart::Text {
                    text: VISION_INSTRUCTION,
                },
                GeminiPart::InlineData {
                    inline_data: InlineData { mime_type, data },
                },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: 0.2,
            top_p: None,
            max_output_tokens: VISION_MAX_TOKENS,
            frequency_penalty: None,
        },
    }
}

fn extract_text(response: GeminiResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| {
            candidate
                .content
                .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
        })
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "frequencyPenalty", skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct GeminiErrorResponse {
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_model_endpoint() {
        let url = model_endpoint(
            "https://generativelanguage.googleapis.com/v1beta/models/",
            "gemini-2.5-flash",
        )
        .expect("url");
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn text_request_carries_generation_config() {
        let mut params = GenerationParams::new(0.9, 64);
        params.top_p = Some(0.95);
        let json = serde_json::to_value(text_request("Prompt", &params)).expect("serialize");

        assert_eq!(json["contents"][0]["parts"][0]["text"], "Prompt");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 64);
        assert!(json["generationConfig"].get("frequencyPenalty").is_none());
        assert!((json["generationConfig"]["topP"].as_f64().unwrap() - 0.95).abs() < 1e-6);
    }

    #[test]
    fn vision_request_inlines_image() {
        let json = serde_json::to_value(vision_request("image/png", "iVBORw==")).expect("serialize");
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], VISION_INSTRUCTION);
        assert_eq!(parts[1]["inline_data"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "iVBORw==");
    }

    #[test]
    fn extracts_first_text_part() {
        let payload = r#"{"candidates":[{"content":{"parts":[{"text":"Opulence redefined."}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(payload).expect("parse");
        assert_eq!(extract_text(parsed).as_deref(), Some("Opulence redefined."));

        let blocked: GeminiResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).expect("parse");
        assert_eq!(extract_text(blocked), None);
    }
}
