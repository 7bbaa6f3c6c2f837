//! Built-in prompt templates for one-shot actions.
//!
//! Each one can be overridden through settings; these are only fallbacks.

pub const REWRITE_SYSTEM_PROMPT: &str =
    "You are a helpful writing assistant that improves text clarity and quality.";

pub const DEFAULT_REWRITE_PROMPT: &str = "Please rewrite the following text to make it clearer, more concise, and better structured while preserving the original meaning:";

pub const ASK_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Provide clear, concise, and informative responses.";

pub const ASK_INSTRUCTION: &str = "Please analyze or answer questions about the following text.";

pub const DEFAULT_ENHANCE_TEMPLATE_EN: &str = "# Role: Prompt Coach

Take the prompt inside the INPUT tags and extend it so another AI gives a longer, more specific and better structured answer.

## Guidelines:
1. Start with the exact text of the input prompt.
2. Append follow-up probes that ask for causes, concrete examples, limitations and a step-by-step structure.
3. Keep the tone of a curious, demanding user.

## Output Rules:
- Output only the combined prompt.
- Do not explain your changes.
- Do not output the INPUT tags.

## Prompt to be Optimized:
<INPUT>${action.selectedText ?? ''}</INPUT>";

pub const DEFAULT_ENHANCE_TEMPLATE_ZH: &str = "# 角色：提示词教练

把 INPUT 标签中的提示词改写为结构清晰的专家级提示词，引导 AI 给出更长、更具体的回答。

## 操作指南：
1. 保留原提示词的核心意图。
2. 为 AI 指定角色、任务、上下文和输出格式。
3. 要求提供具体示例或数据支持。

## 输出规则：
- 只输出重写后的提示词。
- 不要解释修改过程。
- 不要输出 INPUT 标签。

## 待优化提示词：
<INPUT>${action.selectedText ?? ''}</INPUT>";

pub const ENHANCE_FALLBACK_USER_EN: &str =
    "Please refine the text according to the system instructions.";

pub const ENHANCE_FALLBACK_USER_ZH: &str = "请按照系统指令优化文本。";

/// `{{to}}` is replaced with the target language label.
pub const IN_PLACE_TRANSLATION_TEMPLATE: &str = "You are a professional {{to}} native translator who fluently translates text into {{to}}.

## Translation Rules
1. Output only the translated content, without explanations.
2. Keep exactly the same number of paragraphs and the same format as the original.
3. Keep content that should not be translated (proper nouns, code) as is.
4. If the input contains %%, use %% between translated paragraphs; otherwise do not use %%.";
