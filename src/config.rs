//! Application configuration

use std::env;

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_DIALOGUE_LANGUAGE: &str = "Traditional Chinese";
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Google generative AI credential
    pub api_key: String,
    /// Gemini REST base URL
    pub api_base: String,
    /// Model used to write the comic script
    pub text_model: String,
    /// Model used to draw each panel
    pub image_model: String,
    /// Language the dialogue must be written in
    pub dialogue_language: String,
    /// Largest accepted request body, reference image included
    pub max_body_bytes: usize,
    /// HTTP listen port
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("GOOGLE_API_KEY")
            .or_else(|_| env::var("GEMINI_API_KEY"))
            .map_err(|_| anyhow!("GOOGLE_API_KEY (or GEMINI_API_KEY) environment variable is required"))?;
        if api_key.trim().is_empty() {
            return Err(anyhow!("GOOGLE_API_KEY must not be empty"));
        }

        Ok(Self {
            api_key,
            api_base: env::var("GEMINI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            text_model: env::var("GEMINI_TEXT_MODEL").unwrap_or_else(|_| DEFAULT_TEXT_MODEL.to_string()),
            image_model: env::var("GEMINI_IMAGE_MODEL").unwrap_or_else(|_| DEFAULT_IMAGE_MODEL.to_string()),
            dialogue_language: env::var("COMIC_DIALOGUE_LANGUAGE")
                .unwrap_or_else(|_| DEFAULT_DIALOGUE_LANGUAGE.to_string()),
            max_body_bytes: match env::var("MAX_BODY_BYTES") {
                Ok(v) => v.parse().context("MAX_BODY_BYTES must be a byte count")?,
                Err(_) => DEFAULT_MAX_BODY_BYTES,
            },
            port: match env::var("PORT") {
                Ok(v) => v.parse().context("PORT must be a valid port number")?,
                Err(_) => 8080,
            },
        })
    }

    /// Key prefix safe to print in startup logs.
    pub fn masked_key(&self) -> String {
        let shown: String = self.api_key.chars().take(4).collect();
        format!("{shown}***")
    }
}
