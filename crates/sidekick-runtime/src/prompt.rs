//! Chat prompt assembly.

use sidekick_protocols::{HostChatPayload, QuoteRef, Role};

struct QuoteStrings {
    instruction: &'static str,
    context_header: &'static str,
    question_header: &'static str,
    missing_question: &'static str,
}

const QUOTE_STRINGS_EN: QuoteStrings = QuoteStrings {
    instruction: "You are an AI assistant. You are provided with a piece of text quoted from a webpage as context. Please answer the user's next question strictly based on this context.",
    context_header: "Context",
    question_header: "User Question",
    missing_question: "(The user has not asked a specific question yet.)",
};

const QUOTE_STRINGS_ZH: QuoteStrings = QuoteStrings {
    instruction: "你是一个AI助手。现在为你提供一段从网页上引用的文本作为上下文，请你严格基于此上下文来回答用户接下来的问题。",
    context_header: "上下文",
    question_header: "用户问题",
    missing_question: "（用户尚未提供明确问题）",
};

fn quote_strings(language: Option<&str>) -> &'static QuoteStrings {
    match language {
        Some("zh") | Some("zh_CN") | Some("zh-CN") => &QUOTE_STRINGS_ZH,
        _ => &QUOTE_STRINGS_EN,
    }
}

/// Block-quote each non-empty quote with its source and append the question.
///
/// Returns an empty string when no quote has text.
pub fn build_quote_section(quotes: &[QuoteRef], question: &str, language: Option<&str>) -> String {
    let formatted: Vec<String> = quotes
        .iter()
        .filter_map(|quote| {
            let text = quote.text.trim();
            if text.is_empty() {
                return None;
            }
            let quoted = text
                .lines()
                .map(|line| format!("> {}", line))
                .collect::<Vec<_>>()
                .join("\n");
            let header = quote
                .source_title
                .as_deref()
                .filter(|title| !title.is_empty())
                .or(quote.source_url.as_deref().filter(|url| !url.is_empty()));
            Some(match header {
                Some(header) => format!("{}\n> — {}", quoted, header),
                None => quoted,
            })
        })
        .collect();

    if formatted.is_empty() {
        return String::new();
    }

    let strings = quote_strings(language);
    let question = match question.trim() {
        "" => strings.missing_question,
        trimmed => trimmed,
    };

    [
        strings.instruction.to_string(),
        String::new(),
        format!("# {}", strings.context_header),
        String::new(),
        formatted.join("\n\n"),
        String::new(),
        format!("# {}", strings.question_header),
        String::new(),
        question.to_string(),
    ]
    .join("\n")
}

/// Join context, history, the message (or quote section) and the language
/// hint into one user prompt.
pub fn build_chat_prompt(payload: &HostChatPayload, language_hint: &str) -> String {
    let mut sections = Vec::new();

    if !payload.contexts.is_empty() {
        let contexts = payload
            .contexts
            .iter()
            .enumerate()
            .map(|(index, ctx)| {
                let header = if !ctx.title.is_empty() {
                    format!("{} ({})", ctx.title, ctx.url)
                } else if !ctx.url.is_empty() {
                    ctx.url.clone()
                } else {
                    format!("Context {}", index + 1)
                };
                format!("Context {}: {}\n{}", index + 1, header, ctx.content)
                    .trim()
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        sections.push(format!("Relevant context from browser tabs:\n{}", contexts));
    }

    if !payload.history.is_empty() {
        let history = payload
            .history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::Assistant => "Assistant",
                    Role::User => "User",
                };
                format!("{}: {}", role, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Conversation so far:\n{}", history));
    }

    let quote_section = build_quote_section(
        &payload.quotes,
        &payload.message,
        payload.response_language.as_deref(),
    );
    if quote_section.is_empty() {
        sections.push(format!("User message:\n{}", payload.message));
    } else {
        sections.push(quote_section);
    }

    if !language_hint.is_empty() {
        sections.push(language_hint.to_string());
    }

    sections.join("\n\n")
}
