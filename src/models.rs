use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ComicError;

/// Body of `POST /api/generate`. Missing fields are passed to the script
/// writer as empty context.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub story_idea: Option<String>,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub setting: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    /// `data:<mime>;base64,<payload>` or a bare base64 payload.
    #[serde(default)]
    pub uploaded_image_base64: Option<String>,
}

impl GenerateRequest {
    pub fn story_idea(&self) -> &str { self.story_idea.as_deref().unwrap_or_default() }
    pub fn character(&self) -> &str { self.character.as_deref().unwrap_or_default() }
    pub fn setting(&self) -> &str { self.setting.as_deref().unwrap_or_default() }
    pub fn style(&self) -> &str { self.style.as_deref().unwrap_or_default() }

    /// Decodes the uploaded reference image, if one was sent.
    pub fn reference_image(&self) -> Result<Option<InlineImage>, ComicError> {
        match self.uploaded_image_base64.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => InlineImage::parse(raw).map(Some),
        }
    }
}

/// Image bytes carried inline as base64, both for the uploaded reference and
/// for what the image model returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self { mime_type: mime_type.into(), data: data.into() }
    }

    /// Accepts a `data:` URI or bare base64. Bare payloads get their MIME type
    /// sniffed from the decoded bytes.
    pub fn parse(raw: &str) -> Result<Self, ComicError> {
        let (declared_mime, payload) = match raw.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| ComicError::InvalidReferenceImage("data URI has no payload".into()))?;
                if !header.ends_with(";base64") {
                    return Err(ComicError::InvalidReferenceImage("data URI is not base64 encoded".into()));
                }
                let mime = header.trim_end_matches(";base64");
                (if mime.is_empty() { None } else { Some(mime.to_string()) }, payload)
            }
            None => (None, raw),
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| ComicError::InvalidReferenceImage(format!("payload is not valid base64: {e}")))?;
        if bytes.is_empty() {
            return Err(ComicError::InvalidReferenceImage("payload is empty".into()));
        }

        let mime_type = match declared_mime {
            Some(mime) => mime,
            None => image::guess_format(&bytes)
                .map(|format| format.to_mime_type().to_string())
                .map_err(|_| ComicError::InvalidReferenceImage("unrecognized image format".into()))?,
        };

        Ok(Self { mime_type, data: payload.trim().to_string() })
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// One panel exactly as the model wrote it. Fields are read leniently and
/// serialized back untouched, so `panel_number`, captions and the like reach
/// the caller unchanged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct Panel(Map<String, Value>);

impl Panel {
    /// The model's own identifier from `panel` or `panel_number`, any scalar.
    pub fn label(&self) -> Option<String> {
        ["panel", "panel_number"].iter().find_map(|key| match self.0.get(*key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Missing, null or non-text prompts read as empty.
    pub fn image_prompt(&self) -> &str {
        self.0.get("image_prompt").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn dialogue(&self) -> Option<&Value> {
        self.0.get("dialogue").filter(|v| !v.is_null())
    }

    /// Label used in error messages: the model's own identifier, or the
    /// 1-based position when it gave none.
    pub fn display_label(&self, index: usize) -> String {
        self.label().unwrap_or_else(|| format!("#{}", index + 1))
    }
}

/// Canonical script: always a `panels` list, plus whatever other top-level
/// fields (title, synopsis, ...) the model returned.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Script {
    pub panels: Vec<Panel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub script: Script,
    /// One data URI per panel, same order as `script.panels`.
    pub panel_images: Vec<String>,
}
