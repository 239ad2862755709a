use crate::models::GenerateRequest;

/// Appended to every image prompt so the image model does not paint garbled lettering.
pub const NO_TEXT_SUFFIX: &str = "no text, textless, no words, clean art";

pub fn script_system_instruction(dialogue_language: &str) -> String {
    format!(
        "You are a comic script writer creating comics for {dialogue_language} readers. \
        Turn the user's idea into a comic script.\n\
        Most important rules:\n\
        - The `dialogue` field must be written ONLY in {dialogue_language}. Never use English letters or words in dialogue.\n\
        - The `image_prompt` field must be written ONLY in English so the image model understands it.\n\
        - Your output MUST be a single JSON object of the form {{\"panels\": [{{\"panel\": 1, \"dialogue\": \"...\", \"image_prompt\": \"...\"}}]}} with no comments.\n\
        Build every `image_prompt` in exactly this order:\n\
        1. Character first: translate the user's [Character] description into English in full and put it at the very start of every panel's image_prompt. \
        This keeps the character consistent; never omit or alter it.\n\
        2. Scene and action: after the character, describe this panel's scene and action.\n\
        3. Style and extras: finish with the user's chosen [Style] followed by `, {NO_TEXT_SUFFIX}`.\n\
        Example: image_prompt: \"[character description in English], [scene and action], [comic style], {NO_TEXT_SUFFIX}\"\n\
        Before answering, check again that every dialogue is in {dialogue_language} and every image_prompt starts with the character description."
    )
}

pub fn script_user_input(req: &GenerateRequest) -> String {
    format!(
        "[Story idea]: \"{}\"\n[Character]: \"{}\"\n[Setting]: \"{}\"\n[Style]: \"{}\"",
        req.story_idea(),
        req.character(),
        req.setting(),
        req.style()
    )
}

/// Text sent next to the reference image: appearance comes from the image,
/// the panel prompt only drives action, expression and scene.
pub fn consistency_instruction(panel_prompt: &str) -> String {
    format!(
        "**Crucial Instruction:** The character's appearance (face, hairstyle, clothes) MUST be identical to the provided reference image. \
        Use the following text ONLY for the character's action, expression, and the scene's context. \
        DO NOT change the character's appearance based on the text description. \n\n**Context:** {panel_prompt}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_input_labels_each_field() {
        let req = GenerateRequest {
            story_idea: Some("X".into()),
            character: Some("Y".into()),
            setting: Some("Z".into()),
            style: Some("W".into()),
            uploaded_image_base64: None,
        };
        assert_eq!(
            script_user_input(&req),
            "[Story idea]: \"X\"\n[Character]: \"Y\"\n[Setting]: \"Z\"\n[Style]: \"W\""
        );
    }

    #[test]
    fn missing_fields_become_empty_context() {
        let input = script_user_input(&GenerateRequest::default());
        assert!(input.contains("[Character]: \"\""));
    }

    #[test]
    fn system_instruction_names_target_language() {
        let instruction = script_system_instruction("Traditional Chinese");
        assert!(instruction.contains("ONLY in Traditional Chinese"));
        assert!(instruction.contains(NO_TEXT_SUFFIX));
    }

    #[test]
    fn consistency_instruction_embeds_panel_prompt() {
        let text = consistency_instruction("a cat juggling oranges");
        assert!(text.ends_with("**Context:** a cat juggling oranges"));
        assert!(text.contains("identical to the provided reference image"));
    }
}
