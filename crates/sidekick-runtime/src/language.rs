//! Response-language handling.
//!
//! The model is always instructed to emit English; any other requested
//! language is reached by translating the finished answer.

use tracing::{debug, warn};

use sidekick_protocols::{Availability, CapabilityError, CapabilityProvider};

/// Canonical language code, or `None` for "auto" / unset.
pub fn normalize_language_code(code: Option<&str>) -> Option<String> {
    match code.map(str::trim) {
        None | Some("") | Some("auto") => None,
        Some("zh_CN") | Some("zh-CN") => Some("zh".to_string()),
        Some(other) => Some(other.to_string()),
    }
}

/// Prompt hint asking for a reply in `code`; empty for "auto" / unset.
pub fn language_instruction(code: Option<&str>) -> String {
    match code.map(str::trim) {
        None | Some("") | Some("auto") => String::new(),
        Some("zh_CN") | Some("zh-CN") => "Please respond in Simplified Chinese.".to_string(),
        Some("en") => "Please respond in English.".to_string(),
        Some(other) => format!("Please respond in {}.", other),
    }
}

pub fn is_chinese_language_code(code: Option<&str>) -> bool {
    normalize_language_code(code).as_deref() == Some("zh")
}

/// Output language passed to session creation.
pub fn resolve_output_language(_desired: Option<&str>) -> &'static str {
    "en"
}

/// Translate `text` into `desired` when it is not already in that language.
///
/// Returns `text` unchanged when no target is set, the text is blank, the
/// detected language already matches or no translator exists for the pair.
pub async fn ensure_result_language(
    provider: &dyn CapabilityProvider,
    text: &str,
    desired: Option<&str>,
) -> Result<String, CapabilityError> {
    let Some(target) = normalize_language_code(desired) else {
        return Ok(text.to_string());
    };
    if text.trim().is_empty() {
        return Ok(text.to_string());
    }

    let source = match provider.detect_language(text).await {
        Ok(Some(detected)) => detected,
        Ok(None) => "en".to_string(),
        Err(e) => {
            warn!("Language detection failed for result: {}", e);
            "en".to_string()
        }
    };

    if source == target {
        return Ok(text.to_string());
    }

    if provider.translator_availability(&source, &target).await? == Availability::Unavailable {
        debug!(source = %source, target = %target, "No translator for language pair");
        return Ok(text.to_string());
    }

    provider.translate(text, &source, &target).await
}
