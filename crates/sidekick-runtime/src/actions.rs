//! One-shot AI actions run inside the host.
//!
//! Every action that needs a conversational session creates a short-lived
//! one and releases it before returning, whatever the outcome.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use sidekick_config::SessionConfig;
use sidekick_protocols::{
    ActionOptions, ActionResult, AiAction, Availability, CapabilityError, CapabilityProvider,
    SessionHandle, SettingsStore, SummaryOptions,
};

use crate::language::{
    ensure_result_language, is_chinese_language_code, language_instruction,
    normalize_language_code,
};
use crate::session_cache::create_language_session;
use crate::templates;

#[cfg(test)]
#[path = "actions_tests.rs"]
mod tests;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\$\{action\.selectedText\s*\?\?\s*(?:''|"")\}"#).expect("valid placeholder regex")
});
static INPUT_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<INPUT>.*?</INPUT>").expect("valid input block regex"));
static INPUT_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?INPUT>").expect("valid input tag regex"));
static INPUT_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*##\s*(?:Text\s*to\s*(?:Refine|Process|Optimize)|Prompt\s*to\s*be\s*Optimized|待处理文本|待优化文本|待优化提示词)[:：]?\s*(?:\r?\n)?",
    )
    .expect("valid heading regex")
});
static BLANK_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));
static SURROUNDING_QUOTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"|"$"#).expect("valid quote regex"));
static HERE_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Here\b.*?:").expect("valid prefix regex"));
static HERE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*Here\b.*?\n+").expect("valid prefix line regex"));
static BOLD_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\*\*[^\n]+\*\*\s*:*").expect("valid bold heading regex"));

/// Runs [`AiAction`]s against the capability provider.
pub struct ActionRunner {
    provider: Arc<dyn CapabilityProvider>,
    settings: Arc<dyn SettingsStore>,
    prompt_timeout: Duration,
    download_timeout: Duration,
}

impl ActionRunner {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        settings: Arc<dyn SettingsStore>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            provider,
            settings,
            prompt_timeout: config.prompt_timeout(),
            download_timeout: config.download_timeout(),
        }
    }

    /// Run one action. Failures come back as an unsuccessful [`ActionResult`]
    /// carrying the error code.
    pub async fn run(&self, kind: AiAction, text: &str, options: &ActionOptions) -> ActionResult {
        debug!(action = ?kind, chars = text.chars().count(), "Running AI action");
        let outcome = match kind {
            AiAction::Translate => self.translate(text, options).await,
            AiAction::Summarize => self.summarize(text, options).await,
            AiAction::Rewrite => self.rewrite(text, options).await,
            AiAction::AskAi => self.ask(text, options).await,
            AiAction::Enhance => self.enhance(text, options).await,
            AiAction::InPlaceTranslate => self.in_place_translate(text).await,
        };

        match outcome {
            Ok(result) => ActionResult::ok(result),
            Err(e) => {
                error!(action = ?kind, "AI action failed: {}", e);
                ActionResult::failed(e.code(), e.to_string())
            }
        }
    }

    async fn response_language(&self, options: &ActionOptions) -> Option<String> {
        match options.response_language.as_deref() {
            Some(language) if !language.is_empty() => Some(language.to_string()),
            _ => self.settings.get_string("responseLanguage").await,
        }
    }

    async fn detect_source(&self, text: &str) -> String {
        match self.provider.detect_language(text).await {
            Ok(Some(language)) => language,
            Ok(None) => "en".to_string(),
            Err(e) => {
                warn!("Language detection failed: {}", e);
                "en".to_string()
            }
        }
    }

    async fn translate(
        &self,
        text: &str,
        options: &ActionOptions,
    ) -> Result<String, CapabilityError> {
        let preferred = self.response_language(options).await;
        let source = self.detect_source(text).await;
        let fallback = if source == "en" { "zh" } else { "en" };
        let target =
            normalize_language_code(preferred.as_deref()).unwrap_or_else(|| fallback.to_string());

        if target == source {
            return Ok(text.to_string());
        }

        if self.provider.translator_availability(&source, &target).await? == Availability::Unavailable
        {
            return Err(CapabilityError::NotAvailable(format!(
                "Translation from {} to {} is not supported",
                source, target
            )));
        }

        self.bounded("Translation", self.provider.translate(text, &source, &target))
            .await
    }

    async fn summarize(
        &self,
        text: &str,
        options: &ActionOptions,
    ) -> Result<String, CapabilityError> {
        if self.provider.summarizer_availability().await? == Availability::Unavailable {
            return Err(CapabilityError::ModelUnavailable(
                "Summarizer is not available on this device".to_string(),
            ));
        }

        let defaults = SummaryOptions::default();
        let summary_options = SummaryOptions {
            kind: self
                .settings
                .get_string("summaryType")
                .await
                .unwrap_or(defaults.kind),
            length: self
                .settings
                .get_string("summaryLength")
                .await
                .unwrap_or(defaults.length),
            format: self
                .settings
                .get_string("summaryFormat")
                .await
                .unwrap_or(defaults.format),
        };

        let summary = self
            .bounded("Summarize", self.provider.summarize(text, &summary_options))
            .await?;
        let language = self.response_language(options).await;
        ensure_result_language(self.provider.as_ref(), &summary, language.as_deref()).await
    }

    async fn rewrite(&self, text: &str, options: &ActionOptions) -> Result<String, CapabilityError> {
        let language = self.response_language(options).await;
        let instruction = self
            .settings
            .get_string("rewritePrompt")
            .await
            .unwrap_or_else(|| templates::DEFAULT_REWRITE_PROMPT.to_string());
        let prompt = with_hint(&instruction, language.as_deref(), text);

        let session = self
            .session(
                templates::REWRITE_SYSTEM_PROMPT,
                language.as_deref(),
                options.force_download,
            )
            .await?;
        let result = self.prompt_and_release(&session, &prompt).await?;
        ensure_result_language(self.provider.as_ref(), &result, language.as_deref()).await
    }

    async fn ask(&self, text: &str, options: &ActionOptions) -> Result<String, CapabilityError> {
        let language = self.response_language(options).await;
        let prompt = with_hint(templates::ASK_INSTRUCTION, language.as_deref(), text);

        let session = self
            .session(
                templates::ASK_SYSTEM_PROMPT,
                language.as_deref(),
                options.force_download,
            )
            .await?;
        let result = self.prompt_and_release(&session, &prompt).await?;
        ensure_result_language(self.provider.as_ref(), &result, language.as_deref()).await
    }

    async fn enhance(&self, text: &str, options: &ActionOptions) -> Result<String, CapabilityError> {
        let language = self.response_language(options).await;
        let chinese = is_chinese_language_code(language.as_deref());
        let sanitized = sanitize_enhance_input(text);
        let template = self
            .settings
            .get_string("enhanceTemplate")
            .await
            .map(|template| template.trim().to_string())
            .filter(|template| !template.is_empty())
            .unwrap_or_else(|| default_enhance_template(chinese).to_string());

        let resolved = resolve_enhance_template(&template, &sanitized, chinese);
        let (system_prompt, user_prompt) = split_enhance_template(&resolved, &sanitized, chinese);

        let session = self
            .session(&system_prompt, language.as_deref(), options.force_download)
            .await?;
        let result = self.prompt_and_release(&session, &user_prompt).await?;
        let cleaned = sanitize_enhanced_result(&result);
        ensure_result_language(self.provider.as_ref(), &cleaned, language.as_deref()).await
    }

    async fn in_place_translate(&self, text: &str) -> Result<String, CapabilityError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(text.to_string());
        }

        let target = self
            .settings
            .get_string("inputTranslationTargetLanguage")
            .await
            .unwrap_or_else(|| "en".to_string());
        let label = target_language_label(&target);
        let system_prompt = templates::IN_PLACE_TRANSLATION_TEMPLATE.replace("{{to}}", label);
        let user_prompt = in_place_user_prompt(label, trimmed);

        let session = self.session(&system_prompt, Some("en"), true).await?;
        let response = self.prompt_and_release(&session, &user_prompt).await?;

        let preliminary = response.trim();
        if preliminary.is_empty() {
            return Err(CapabilityError::Failed("No translation result".to_string()));
        }

        let ensured =
            ensure_result_language(self.provider.as_ref(), preliminary, Some(target.as_str())).await?;
        let result = normalize_in_place_output(&ensured);
        if result.is_empty() {
            return Err(CapabilityError::Failed("Translation unavailable".to_string()));
        }
        Ok(result)
    }

    async fn session(
        &self,
        system_prompt: &str,
        language: Option<&str>,
        force_download: bool,
    ) -> Result<SessionHandle, CapabilityError> {
        create_language_session(
            self.provider.as_ref(),
            system_prompt,
            language,
            force_download,
            self.download_timeout,
        )
        .await
    }

    async fn prompt_and_release(
        &self,
        session: &SessionHandle,
        prompt: &str,
    ) -> Result<String, CapabilityError> {
        let result = self.bounded("Prompt call", session.prompt(prompt)).await;
        session.release();
        result
    }

    async fn bounded<F>(&self, operation: &str, call: F) -> Result<String, CapabilityError>
    where
        F: std::future::Future<Output = Result<String, CapabilityError>>,
    {
        timeout(self.prompt_timeout, call)
            .await
            .map_err(|_| CapabilityError::timeout(operation, self.prompt_timeout))?
    }
}

fn with_hint(instruction: &str, language: Option<&str>, text: &str) -> String {
    let hint = language_instruction(language);
    if hint.is_empty() {
        format!("{}\n\n{}", instruction, text)
    } else {
        format!("{}\n\n{}\n\n{}", instruction, hint, text)
    }
}

fn default_enhance_template(chinese: bool) -> &'static str {
    if chinese {
        templates::DEFAULT_ENHANCE_TEMPLATE_ZH
    } else {
        templates::DEFAULT_ENHANCE_TEMPLATE_EN
    }
}

fn sanitize_enhance_input(text: &str) -> String {
    INPUT_TAG_RE.replace_all(text, "").into_owned()
}

fn strip_input_headings(text: &str) -> String {
    let cleaned = INPUT_BLOCK_RE.replace_all(text, "");
    let cleaned = INPUT_HEADING_RE.replace_all(&cleaned, "");
    let cleaned = BLANK_RUN_RE.replace_all(&cleaned, "\n\n");
    cleaned.trim().to_string()
}

/// Put `content` where the template expects the selected text.
fn resolve_enhance_template(template: &str, content: &str, chinese: bool) -> String {
    let base = if template.trim().is_empty() {
        default_enhance_template(chinese)
    } else {
        template
    };

    let replaced = PLACEHOLDER_RE.replace_all(base, NoExpand(content));
    if replaced != base {
        return replaced.into_owned();
    }

    if base.contains("<INPUT>") && base.contains("</INPUT>") {
        let block = format!("<INPUT>{}</INPUT>", content);
        return INPUT_BLOCK_RE.replace(base, NoExpand(&block)).into_owned();
    }

    if content.is_empty() {
        return base.to_string();
    }

    format!("{}\n\n<INPUT>{}</INPUT>", base, content)
}

/// Split a resolved template into `(system prompt, user prompt)`: the
/// `<INPUT>` block becomes the user prompt, the rest the system prompt.
///
/// A template that leaves no system instructions behind is replaced by the
/// built-in one.
fn split_enhance_template(resolved: &str, content: &str, chinese: bool) -> (String, String) {
    let (system_prompt, user_prompt) = split_once(resolved, content, chinese);
    if !system_prompt.is_empty() {
        return (system_prompt, user_prompt);
    }

    let fallback = default_enhance_template(chinese);
    let (system_prompt, user_prompt) =
        split_once(&resolve_enhance_template(fallback, content, chinese), content, chinese);
    if system_prompt.is_empty() {
        (fallback.to_string(), user_prompt)
    } else {
        (system_prompt, user_prompt)
    }
}

fn split_once(template: &str, content: &str, chinese: bool) -> (String, String) {
    match INPUT_BLOCK_RE.find(template) {
        Some(found) => {
            let remainder = format!("{}{}", &template[..found.start()], &template[found.end()..]);
            (
                strip_input_headings(&remainder),
                found.as_str().trim().to_string(),
            )
        }
        None => {
            let user_prompt = if !content.is_empty() {
                format!("<INPUT>{}</INPUT>", content)
            } else if chinese {
                templates::ENHANCE_FALLBACK_USER_ZH.to_string()
            } else {
                templates::ENHANCE_FALLBACK_USER_EN.to_string()
            };
            (strip_input_headings(template), user_prompt)
        }
    }
}

/// Drop tags, wrapping quotes and "Here is ..." preambles the model adds.
fn sanitize_enhanced_result(result: &str) -> String {
    let cleaned = result.trim();
    if cleaned.is_empty() {
        return String::new();
    }
    let cleaned = INPUT_TAG_RE.replace_all(cleaned, "");
    let cleaned = SURROUNDING_QUOTES_RE.replace_all(&cleaned, "");
    let cleaned = HERE_PREFIX_RE.replace(&cleaned, "");
    let cleaned = HERE_LINE_RE.replace(&cleaned, "");
    let cleaned = BOLD_HEADING_RE.replace(&cleaned, "");
    cleaned.trim().to_string()
}

fn target_language_label(code: &str) -> &'static str {
    match code {
        "zh_CN" | "zh-CN" | "zh" => "Simplified Chinese",
        _ => "English",
    }
}

fn in_place_user_prompt(label: &str, content: &str) -> String {
    [
        format!("Translate the following text into {}.", label),
        "Apply the translation rules from the system prompt. Return only the translated content without commentary.".to_string(),
        "If multiple paragraphs exist, preserve structure and separate paragraphs with %% as instructed.".to_string(),
        String::new(),
        "<INPUT>".to_string(),
        content.trim_end().to_string(),
        "</INPUT>".to_string(),
    ]
    .join("\n")
}

/// Turn `%%` paragraph separators back into blank lines.
fn normalize_in_place_output(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.contains("%%") {
        return trimmed.to_string();
    }
    trimmed
        .split("%%")
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}
