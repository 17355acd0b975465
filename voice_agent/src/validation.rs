use crate::error::ApiError;

/// Maximum transcript length accepted by the control surface, in characters
pub const MAX_TRANSCRIPT_LENGTH: usize = 2000;

/// Validates a submitted transcript, returning it trimmed
pub fn validate_transcript(text: &str) -> Result<&str, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TRANSCRIPT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TRANSCRIPT_LENGTH
        )));
    }
    Ok(text)
}
