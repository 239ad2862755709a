use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::models::InlineImage;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no text content in response")]
    MissingText,
    #[error("prompt was blocked: {0}")]
    Blocked(String),
}

/// Writes a comic script as loosely structured JSON.
#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn write_script(&self, system_instruction: &str, user_input: &str) -> Result<Value, GeminiError>;
}

/// One image generation call for one panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRequest {
    pub text: String,
    pub reference: Option<InlineImage>,
}

/// Draws one panel. `Ok(None)` means the call succeeded but no image came back.
#[async_trait]
pub trait PanelRenderer: Send + Sync {
    async fn render_panel(&self, request: &PanelRequest) -> Result<Option<InlineImage>, GeminiError>;
}

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

fn safety_settings() -> Vec<Value> {
    HARM_CATEGORIES
        .iter()
        .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
        .collect()
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 {
                            let head: String = s.chars().take(50).collect();
                            *val = Value::String(format!("{}...[truncated {} chars]", head, s.len() - head.len()));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable(value: &Value) -> String {
    let mut copy = value.clone();
    truncate_base64_in_json(&mut copy);
    serde_json::to_string(&copy).unwrap_or_default()
}

/// Models sometimes wrap JSON in a Markdown fence even when asked for
/// `application/json`.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn script_request_body(system_instruction: &str, user_input: &str) -> Value {
    json!({
        "systemInstruction": { "role": "system", "parts": [{ "text": system_instruction }] },
        "contents": [{ "role": "user", "parts": [{ "text": user_input }] }],
        "generationConfig": { "responseMimeType": "application/json" },
        "safetySettings": safety_settings(),
    })
}

pub fn panel_request_body(request: &PanelRequest) -> Value {
    let mut parts = Vec::with_capacity(2);
    if let Some(reference) = &request.reference {
        parts.push(json!({
            "inlineData": { "mimeType": reference.mime_type, "data": reference.data }
        }));
    }
    parts.push(json!({ "text": request.text }));

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        "safetySettings": safety_settings(),
    })
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
        }
    }

    async fn perform_api_call(&self, model: &str, body: &Value) -> Result<GeminiResponse, GeminiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        info!("🔗 Making request to: {}", url);
        debug!("📤 Request body: {}", loggable(body));

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await.map_err(|e| GeminiError::Http(e.to_string()))?;
        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(GeminiError::Status { status: status.as_u16(), body: response_text });
        }

        let parsed: Value = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Parse(format!("invalid response JSON: {e}")))?;
        debug!("📥 Raw Gemini API response: {}", loggable(&parsed));

        serde_json::from_value(parsed).map_err(|e| GeminiError::Parse(format!("unexpected response shape: {e}")))
    }
}

#[async_trait]
impl ScriptWriter for GeminiClient {
    async fn write_script(&self, system_instruction: &str, user_input: &str) -> Result<Value, GeminiError> {
        info!("📝 Generating comic script with {}", self.text_model);
        let body = script_request_body(system_instruction, user_input);
        let response = self.perform_api_call(&self.text_model, &body).await?;
        parse_script_response(&response)
    }
}

/// Pulls the script JSON out of a text model response.
fn parse_script_response(response: &GeminiResponse) -> Result<Value, GeminiError> {
    let Some(text) = response.first_text() else {
        if let Some(reason) = response.block_reason() {
            error!("❌ Script prompt blocked: {}", reason);
            return Err(GeminiError::Blocked(reason.to_string()));
        }
        return Err(GeminiError::MissingText);
    };
    info!("✅ Script text received ({} chars)", text.len());

    serde_json::from_str(strip_code_fence(&text))
        .map_err(|e| GeminiError::Parse(format!("script is not valid JSON: {e}")))
}

#[async_trait]
impl PanelRenderer for GeminiClient {
    async fn render_panel(&self, request: &PanelRequest) -> Result<Option<InlineImage>, GeminiError> {
        info!(
            "🎨 Rendering panel with {} (reference image: {})",
            self.image_model,
            request.reference.is_some()
        );
        let body = panel_request_body(request);
        let response = self.perform_api_call(&self.image_model, &body).await?;

        let image = response.first_image();
        match &image {
            Some(img) => info!("🖼️ Extracted {} image ({} base64 chars)", img.mime_type, img.data.len()),
            None => info!("⚠️ No image data found in API response"),
        }
        Ok(image)
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    #[allow(dead_code)]
    Other(Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

impl GeminiResponse {
    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }

    /// All text parts of the first candidate joined together.
    fn first_text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }

    fn first_image(&self) -> Option<InlineImage> {
        self.candidates
            .iter()
            .flat_map(|c| c.content.parts.iter())
            .find_map(|p| match p {
                Part::Inline { inline_data } if !inline_data.data.is_empty() => Some(InlineImage::new(
                    inline_data.mime_type.as_deref().unwrap_or("image/png"),
                    inline_data.data.clone(),
                )),
                _ => None,
            })
    }
}
