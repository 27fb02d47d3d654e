//! Prompts for VLM-based figure description.
//!
//! Centralising every prompt here keeps the accessibility style guide in one
//! place and lets unit tests inspect the exact wording without a live model.
//!
//! Callers can override the system prompt via
//! [`crate::config::AltTextConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for describing a figure.
pub const ALT_TEXT_SYSTEM_PROMPT: &str = r#"You are an accessibility specialist. Write alternative text for the attached image that meets WCAG 2.1 AA.

Follow these rules precisely:

1. LENGTH
   - 20 to 200 characters
   - One or two sentences

2. CONTENT
   - Describe what a reader who cannot see the image needs to understand
   - Charts and graphs: name the chart type, the key data points, and the trend
   - Photos and illustrations: name the main subject, setting, and meaning
   - Use the surrounding document text to resolve what the image is about

3. STYLE
   - Do NOT start with "Image of" or "Picture of"
   - Do NOT answer with a generic word such as "image" or "photo" alone
   - Do NOT repeat the surrounding text verbatim
   - Output ONLY the alternative text, without quotes or commentary"#;

/// Build the user-turn text sent alongside the image.
///
/// Empty `context` is rendered as "none" so the model does not mistake a
/// blank section for a formatting error.
pub fn alt_text_user_prompt(title: &str, language: &str, context: &[String]) -> String {
    let title = if title.trim().is_empty() { "(untitled)" } else { title.trim() };
    let context = if context.is_empty() {
        "none".to_string()
    } else {
        context.join("\n")
    };

    format!(
        "Write alternative text for the attached image.\n\n\
         [Document]\n\
         - Title: {title}\n\
         - Language: {language}\n\n\
         [Surrounding text]\n\
         {context}\n\n\
         [Request]\n\
         Describe the image in 1-2 sentences so that a reader who cannot see it understands it. \
         Write in the document language ({language}) and stay within 20-200 characters."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_carries_metadata_and_context() {
        let p = alt_text_user_prompt(
            "Annual Report",
            "en-US",
            &["Figure 3 shows revenue".to_string(), "by quarter".to_string()],
        );
        assert!(p.contains("Title: Annual Report"));
        assert!(p.contains("Language: en-US"));
        assert!(p.contains("Figure 3 shows revenue\nby quarter"));
    }

    #[test]
    fn user_prompt_marks_missing_pieces() {
        let p = alt_text_user_prompt("  ", "ko-KR", &[]);
        assert!(p.contains("(untitled)"));
        assert!(p.contains("[Surrounding text]\nnone"));
    }

    #[test]
    fn system_prompt_states_length_window() {
        assert!(ALT_TEXT_SYSTEM_PROMPT.contains("20 to 200 characters"));
    }
}
