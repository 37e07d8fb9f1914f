//! Best-effort rewrite of known-unsafe phrases before validation.
//!
//! The sanitizer never replaces validation: rewriting can leave residual problems and the
//! validator always runs on its output.

use std::collections::HashMap;

use regex::{Captures, Regex};

use super::phrases::GuardrailCategory;
use super::{literal_alternation, PhraseTableError};

/// `(category, phrase, replacement)`. An empty replacement removes the phrase.
pub const SUBSTITUTIONS: &[(GuardrailCategory, &str, &str)] = &[
    (GuardrailCategory::Promise, "гарантируем возврат денег", "обязательно разберемся в ситуации"),
    (GuardrailCategory::Promise, "гарантируем возврат", "обязательно разберемся в ситуации"),
    (GuardrailCategory::Promise, "гарантируем замену", "поможем решить вопрос"),
    (GuardrailCategory::Promise, "вернем деньги", "поможем решить вопрос"),
    (GuardrailCategory::Promise, "вернём деньги", "поможем решить вопрос"),
    (GuardrailCategory::AiMention, "я бот", ""),
    (GuardrailCategory::AiMention, "как искусственный интеллект", ""),
    (GuardrailCategory::AiMention, "автоматический ответ", ""),
    (GuardrailCategory::AiMention, "сгенерировано автоматически", ""),
    (GuardrailCategory::Blame, "вы сами виноваты", "нам жаль, что так вышло"),
    (GuardrailCategory::Blame, "по вашей вине", ""),
    (GuardrailCategory::Dismissive, "обратитесь в поддержку", "напишите нам, и мы поможем"),
    (GuardrailCategory::Dismissive, "обращайтесь в поддержку", "напишите нам, и мы поможем"),
    (GuardrailCategory::Jargon, "селлер", "продавец"),
    (GuardrailCategory::Jargon, "баркод", "штрихкод"),
];

/// Punctuation that absorbs the whitespace left by a removed phrase.
const CLOSING_PUNCTUATION: [char; 6] = [',', '.', '!', '?', ';', ':'];

#[derive(Clone, Debug)]
pub struct PhraseSanitizer {
    pattern: Regex,
    replacements: HashMap<String, &'static str>,
}

impl PhraseSanitizer {
    pub fn new() -> Result<Self, PhraseTableError> {
        let phrases: Vec<&str> = SUBSTITUTIONS.iter().map(|(_, phrase, _)| *phrase).collect();
        let alternation = literal_alternation(&phrases);
        // `(?i)\b(?:...)\b` wrapped with captured surrounding whitespace.
        let inner = alternation.trim_start_matches("(?i)");
        let pattern = Regex::new(&format!(r"(?i)(?P<lead>\s*)(?P<phrase>{inner})(?P<trail>\s*)"))
            .map_err(|source| PhraseTableError { table: "sanitizer", source })?;

        let replacements = SUBSTITUTIONS
            .iter()
            .map(|(_, phrase, replacement)| (phrase.to_string(), *replacement))
            .collect();

        Ok(Self { pattern, replacements })
    }

    /// Rewrites table phrases. Text outside the rewritten spans is kept as written, apart
    /// from surrounding whitespace being trimmed.
    pub fn sanitize(&self, text: &str) -> String {
        let rewritten = self.pattern.replace_all(text, |captures: &Captures<'_>| {
            let lead = captures.name("lead").map_or("", |m| m.as_str());
            let trail = captures.name("trail").map_or("", |m| m.as_str());
            let phrase = captures.name("phrase").map_or("", |m| m.as_str());
            let end = captures.get(0).map_or(text.len(), |m| m.end());
            let before_punctuation =
                text[end..].starts_with(|next: char| CLOSING_PUNCTUATION.contains(&next));

            match self.replacements.get(&phrase.to_lowercase()) {
                Some(replacement) if replacement.is_empty() => {
                    if before_punctuation || (lead.is_empty() && trail.is_empty()) {
                        String::new()
                    } else {
                        " ".to_string()
                    }
                }
                Some(replacement) => {
                    format!("{lead}{}{trail}", match_case(phrase, replacement))
                }
                None => captures[0].to_string(),
            }
        });

        rewritten.trim().to_string()
    }
}

/// Capitalizes the replacement when the matched phrase started with a capital letter.
fn match_case(original: &str, replacement: &str) -> String {
    let starts_upper = original.chars().next().is_some_and(char::is_uppercase);
    if !starts_upper {
        return replacement.to_string();
    }

    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
