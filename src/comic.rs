use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::error::ComicError;
use crate::gemini::{PanelRenderer, PanelRequest, ScriptWriter};
use crate::models::{GenerateRequest, GenerateResponse, InlineImage, Panel, Script};
use crate::{prompts, script};

/// Script first, then one image per panel, strictly in order. The first
/// failure aborts the whole comic.
pub struct ComicPipeline {
    writer: Arc<dyn ScriptWriter>,
    renderer: Arc<dyn PanelRenderer>,
    dialogue_language: String,
}

impl ComicPipeline {
    pub fn new(writer: Arc<dyn ScriptWriter>, renderer: Arc<dyn PanelRenderer>, dialogue_language: impl Into<String>) -> Self {
        Self { writer, renderer, dialogue_language: dialogue_language.into() }
    }

    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ComicError> {
        let started = Instant::now();
        let reference = request.reference_image()?;
        info!(
            "🚀 Generating comic for idea: {} (reference image: {})",
            request.story_idea(),
            reference.as_ref().map(|r| r.mime_type.as_str()).unwrap_or("none")
        );

        let script = self.write_script(&request).await?;
        info!("📜 Script ready with {} panels", script.panels.len());

        let mut panel_images = Vec::with_capacity(script.panels.len());
        for (index, panel) in script.panels.iter().enumerate() {
            let image = self.render(index, panel, reference.as_ref()).await?;
            panel_images.push(image.to_data_uri());
        }

        info!("✅ Comic generated: {} panels in {:.1?}", panel_images.len(), started.elapsed());
        Ok(GenerateResponse { script, panel_images })
    }

    async fn write_script(&self, request: &GenerateRequest) -> Result<Script, ComicError> {
        let system = prompts::script_system_instruction(&self.dialogue_language);
        let user = prompts::script_user_input(request);
        let raw = self.writer.write_script(&system, &user).await.map_err(ComicError::UpstreamText)?;
        script::normalize(raw)
    }

    async fn render(&self, index: usize, panel: &Panel, reference: Option<&InlineImage>) -> Result<InlineImage, ComicError> {
        let label = panel.display_label(index);
        let request = match reference {
            Some(reference) => PanelRequest {
                text: prompts::consistency_instruction(panel.image_prompt()),
                reference: Some(reference.clone()),
            },
            None => PanelRequest { text: panel.image_prompt().to_string(), reference: None },
        };

        info!("🎯 Rendering panel {}: {}", label, panel.image_prompt().chars().take(100).collect::<String>());
        if let Some(dialogue) = panel.dialogue() {
            debug!("💬 Panel {} dialogue: {}", label, dialogue);
        }
        match self.renderer.render_panel(&request).await {
            Ok(Some(image)) => Ok(image),
            Ok(None) => Err(ComicError::UpstreamImage { panel: label, reason: "the model returned no image data".into() }),
            Err(e) => {
                error!("❌ Panel {} image call failed: {}", label, e);
                Err(ComicError::UpstreamImage { panel: label, reason: e.to_string() })
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeRenderer, FakeWriter};
    use super::*;
    use crate::gemini::GeminiError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn pipeline(writer: &Arc<FakeWriter>, renderer: &Arc<FakeRenderer>) -> ComicPipeline {
        ComicPipeline::new(writer.clone(), renderer.clone(), "Traditional Chinese")
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            story_idea: Some("X".into()),
            character: Some("Y".into()),
            setting: Some("Z".into()),
            style: Some("W".into()),
            uploaded_image_base64: None,
        }
    }

    fn three_panels() -> serde_json::Value {
        json!({ "panels": [
            { "panel": 1, "image_prompt": "A" },
            { "panel": 2, "image_prompt": "B" },
            { "panel": 3, "image_prompt": "C" }
        ]})
    }

    #[tokio::test]
    async fn one_text_only_call_per_panel_without_reference() {
        let writer = Arc::new(FakeWriter::returning(three_panels()));
        let renderer = Arc::new(FakeRenderer::default());

        let response = pipeline(&writer, &renderer).generate(request()).await.unwrap();

        assert_eq!(writer.call_count(), 1);
        let calls = renderer.calls.lock().clone();
        let expected: Vec<PanelRequest> = ["A", "B", "C"]
            .iter()
            .map(|p| PanelRequest { text: p.to_string(), reference: None })
            .collect();
        assert_eq!(calls, expected);
        assert_eq!(
            response.panel_images,
            vec!["data:image/png;base64,IMG1", "data:image/png;base64,IMG2", "data:image/png;base64,IMG3"]
        );
        assert_eq!(response.script.panels.len(), response.panel_images.len());
    }

    #[tokio::test]
    async fn reference_image_goes_with_every_panel() {
        let writer = Arc::new(FakeWriter::returning(three_panels()));
        let renderer = Arc::new(FakeRenderer::default());
        let mut req = request();
        req.uploaded_image_base64 = Some(format!("data:image/png;base64,{PNG_B64}"));

        pipeline(&writer, &renderer).generate(req).await.unwrap();

        let calls = renderer.calls.lock().clone();
        assert_eq!(calls.len(), 3);
        for (call, prompt) in calls.iter().zip(["A", "B", "C"]) {
            assert_eq!(call.reference, Some(InlineImage::new("image/png", PNG_B64)));
            assert_eq!(call.text, prompts::consistency_instruction(prompt));
        }
    }

    #[tokio::test]
    async fn user_input_carries_all_four_fields() {
        let writer = Arc::new(FakeWriter::returning(three_panels()));
        let renderer = Arc::new(FakeRenderer::default());

        pipeline(&writer, &renderer).generate(request()).await.unwrap();

        let (system, user) = writer.calls.lock()[0].clone();
        assert!(system.contains("Traditional Chinese"));
        assert_eq!(user, prompts::script_user_input(&request()));
    }

    #[tokio::test]
    async fn missing_image_aborts_whole_comic() {
        let writer = Arc::new(FakeWriter::returning(three_panels()));
        let renderer = Arc::new(FakeRenderer::with_outcomes(vec![
            Ok(Some(InlineImage::new("image/png", "first"))),
            Ok(None),
        ]));

        let err = pipeline(&writer, &renderer).generate(request()).await.unwrap_err();

        match err {
            ComicError::UpstreamImage { panel, .. } => assert_eq!(panel, "2"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(renderer.call_count(), 2);
    }

    #[tokio::test]
    async fn upstream_image_error_names_unlabeled_panel_by_position() {
        let writer = Arc::new(FakeWriter::returning(json!({ "panels": [{ "image_prompt": "A" }] })));
        let renderer = Arc::new(FakeRenderer::with_outcomes(vec![Err(GeminiError::Status {
            status: 503,
            body: "overloaded".into(),
        })]));

        let err = pipeline(&writer, &renderer).generate(request()).await.unwrap_err();
        assert_eq!(err.to_string(), "image generation failed for panel #1: API returned 503: overloaded");
    }

    #[tokio::test]
    async fn unrecognized_script_makes_no_image_calls() {
        let writer = Arc::new(FakeWriter::returning(json!({ "story": "no panels here" })));
        let renderer = Arc::new(FakeRenderer::default());

        let err = pipeline(&writer, &renderer).generate(request()).await.unwrap_err();

        assert!(matches!(err, ComicError::InvalidScript(_)));
        assert_eq!(renderer.call_count(), 0);
    }

    #[tokio::test]
    async fn script_failure_is_upstream_text_error() {
        let writer = Arc::new(FakeWriter::failing(GeminiError::Parse("script is not valid JSON".into())));
        let renderer = Arc::new(FakeRenderer::default());

        let err = pipeline(&writer, &renderer).generate(request()).await.unwrap_err();

        assert!(matches!(err, ComicError::UpstreamText(_)));
        assert_eq!(renderer.call_count(), 0);
    }

    #[tokio::test]
    async fn bad_reference_fails_before_any_call() {
        let writer = Arc::new(FakeWriter::returning(three_panels()));
        let renderer = Arc::new(FakeRenderer::default());
        let mut req = request();
        req.uploaded_image_base64 = Some("data:image/png;base64,@@@".into());

        let err = pipeline(&writer, &renderer).generate(req).await.unwrap_err();

        assert!(matches!(err, ComicError::InvalidReferenceImage(_)));
        assert_eq!(writer.call_count(), 0);
        assert_eq!(renderer.call_count(), 0);
    }

    #[tokio::test]
    async fn generated_mime_type_is_kept_in_data_uri() {
        let writer = Arc::new(FakeWriter::returning(json!({ "panels": [{ "image_prompt": "A" }] })));
        let renderer = Arc::new(FakeRenderer::with_outcomes(vec![Ok(Some(InlineImage::new("image/jpeg", "JPG")))]));

        let response = pipeline(&writer, &renderer).generate(request()).await.unwrap();
        assert_eq!(response.panel_images, vec!["data:image/jpeg;base64,JPG"]);
    }
}
