//! Content-safety validation for reply text.
//!
//! `GuardrailValidator::validate` is a pure function of the reply, the channel and the
//! customer's original text. Error-severity hits block any send, manual or automated;
//! warnings are only reported.

pub mod phrases;
pub mod sanitizer;

use std::collections::HashMap;
use std::ops::Range;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::interaction::Channel;

pub use phrases::{GuardrailCategory, Severity};
pub use sanitizer::PhraseSanitizer;

#[derive(Debug, Error)]
#[error("phrase table for `{table}` does not compile: {source}")]
pub struct PhraseTableError {
    pub table: &'static str,
    #[source]
    pub source: regex::Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailViolation {
    pub phrase: String,
    pub category: GuardrailCategory,
    pub severity: Severity,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Error-severity hits; any entry blocks the send.
    pub violations: Vec<GuardrailViolation>,
    pub warnings: Vec<GuardrailViolation>,
}

impl ValidationReport {
    pub fn is_blocking(&self) -> bool {
        !self.violations.is_empty()
    }

    fn push(&mut self, violation: GuardrailViolation) {
        match violation.severity {
            Severity::Error => self.violations.push(violation),
            Severity::Warning => self.warnings.push(violation),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GuardrailValidator {
    matchers: HashMap<GuardrailCategory, Regex>,
    reply_return_terms: Regex,
    customer_return_triggers: Regex,
}

impl GuardrailValidator {
    pub fn new() -> Result<Self, PhraseTableError> {
        let mut matchers = HashMap::new();
        for category in GuardrailCategory::PHRASE_CATEGORIES {
            let pattern = literal_alternation(category.phrases());
            let regex = Regex::new(&pattern)
                .map_err(|source| PhraseTableError { table: category.as_str(), source })?;
            matchers.insert(category, regex);
        }

        let reply_return_terms = Regex::new(&fragment_alternation(phrases::REPLY_RETURN_TERMS))
            .map_err(|source| PhraseTableError { table: "reply_return_terms", source })?;
        let customer_return_triggers =
            Regex::new(&fragment_alternation(phrases::CUSTOMER_RETURN_TRIGGERS)).map_err(
                |source| PhraseTableError { table: "customer_return_triggers", source },
            )?;

        Ok(Self { matchers, reply_return_terms, customer_return_triggers })
    }

    pub fn validate(&self, text: &str, channel: Channel, customer_text: &str) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut error_spans: Vec<Range<usize>> = Vec::new();

        for category in GuardrailCategory::PHRASE_CATEGORIES {
            let Some(severity) = category.severity(channel) else {
                continue;
            };
            let Some(matcher) = self.matchers.get(&category) else {
                continue;
            };

            for hit in matcher.find_iter(text) {
                if severity == Severity::Error {
                    error_spans.push(hit.range());
                }
                report.push(GuardrailViolation {
                    phrase: hit.as_str().to_lowercase(),
                    category,
                    severity,
                });
            }
        }

        if let Some(severity) = GuardrailCategory::UnsolicitedReturn.severity(channel) {
            if let Some(violation) = self.unsolicited_return(text, customer_text, &error_spans) {
                report.push(GuardrailViolation { severity, ..violation });
            }
        }

        if let Some(severity) = GuardrailCategory::Length.severity(channel) {
            if let Some(phrase) = length_violation(text, channel) {
                report.push(GuardrailViolation {
                    phrase,
                    category: GuardrailCategory::Length,
                    severity,
                });
            }
        }

        report
    }

    /// Whether the customer's own text mentions a return, refund or exchange.
    pub fn customer_requested_return(&self, customer_text: &str) -> bool {
        self.customer_return_triggers.is_match(customer_text)
    }

    fn unsolicited_return(
        &self,
        text: &str,
        customer_text: &str,
        reported: &[Range<usize>],
    ) -> Option<GuardrailViolation> {
        if self.customer_requested_return(customer_text) {
            return None;
        }

        self.reply_return_terms
            .find_iter(text)
            .find(|hit| {
                !reported.iter().any(|span| span.start < hit.end() && hit.start() < span.end)
            })
            .map(|hit| GuardrailViolation {
                phrase: hit.as_str().to_lowercase(),
                category: GuardrailCategory::UnsolicitedReturn,
                severity: Severity::Error,
            })
    }
}

fn length_violation(text: &str, channel: Channel) -> Option<String> {
    let length = text.trim().chars().count();
    let (min, max) = phrases::length_bounds(channel);

    match min {
        Some(min) if length < min => Some(format!("length {length} < {min}")),
        _ if length > max => Some(format!("length {length} > {max}")),
        _ => None,
    }
}

/// Case-insensitive, word-bounded alternation with longer phrases tried first.
pub(crate) fn literal_alternation(phrases: &[&str]) -> String {
    let mut sorted: Vec<&str> = phrases.to_vec();
    sorted.sort_by(|left, right| right.chars().count().cmp(&left.chars().count()));
    let escaped: Vec<String> = sorted.iter().map(|phrase| regex::escape(phrase)).collect();
    format!(r"(?i)\b(?:{})\b", escaped.join("|"))
}

fn fragment_alternation(fragments: &[&str]) -> String {
    format!(r"(?i)\b(?:{})", fragments.join("|"))
}

#[cfg(test)]
mod tests {
    use super::{GuardrailCategory, GuardrailValidator, Severity};
    use crate::domain::interaction::Channel;

    fn validator() -> GuardrailValidator {
        GuardrailValidator::new().expect("phrase tables compile")
    }

    #[test]
    fn automation_disclosure_is_an_error_everywhere() {
        let validator = validator();
        for channel in Channel::ALL {
            let report = validator.validate(
                "Здравствуйте! Я бот магазина, спасибо за ваш отзыв.",
                channel,
                "Все хорошо",
            );
            assert!(
                report.violations.iter().any(|violation| violation.category
                    == GuardrailCategory::AiMention
                    && violation.severity == Severity::Error),
                "{channel} must block automation disclosure"
            );
        }
    }

    #[test]
    fn guaranteed_refund_in_review_is_a_single_promise_error() {
        let report =
            validator().validate("Мы гарантируем возврат денег", Channel::Review, "Отличный товар!");

        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].category, GuardrailCategory::Promise);
        assert_eq!(report.violations[0].phrase, "гарантируем возврат денег");
        assert!(report.is_blocking());
    }

    #[test]
    fn return_wording_is_allowed_when_customer_asked_for_it() {
        let report = validator().validate(
            "Оформите возврат через ЛК",
            Channel::Question,
            "Хочу оформить возврат",
        );

        assert!(report.violations.is_empty(), "{:?}", report.violations);
        assert!(report
            .warnings
            .iter()
            .all(|warning| warning.category != GuardrailCategory::UnsolicitedReturn));
    }

    #[test]
    fn unsolicited_return_offer_is_blocked_in_public_channels() {
        let validator = validator();
        let reply = "Если размер не подойдет, оформите возврат в течение 14 дней.";

        let review = validator.validate(reply, Channel::Review, "Классная куртка, спасибо");
        assert_eq!(review.violations.len(), 1);
        assert_eq!(review.violations[0].category, GuardrailCategory::UnsolicitedReturn);

        let chat = validator.validate(reply, Channel::Chat, "Классная куртка, спасибо");
        assert!(chat.violations.is_empty());
    }

    #[test]
    fn blame_is_only_a_warning_in_chat() {
        let validator = validator();
        let reply = "К сожалению, вы сами виноваты, в описании все указано.";

        let chat = validator.validate(reply, Channel::Chat, "Не подошло");
        assert!(chat.violations.is_empty());
        assert_eq!(chat.warnings[0].category, GuardrailCategory::Blame);

        let question = validator.validate(reply, Channel::Question, "Не подошло");
        assert_eq!(question.violations[0].category, GuardrailCategory::Blame);
    }

    #[test]
    fn length_bounds_are_warnings_only() {
        let validator = validator();

        let short = validator.validate("Спасибо!", Channel::Review, "Супер");
        assert!(short.violations.is_empty());
        assert_eq!(short.warnings[0].category, GuardrailCategory::Length);

        let short_chat = validator.validate("Спасибо!", Channel::Chat, "Супер");
        assert!(short_chat.warnings.is_empty());

        let long_chat = validator.validate(&"а".repeat(1001), Channel::Chat, "Супер");
        assert_eq!(long_chat.warnings[0].category, GuardrailCategory::Length);
        assert!(long_chat.violations.is_empty());
    }

    #[test]
    fn phrases_match_on_word_boundaries_only() {
        let report = validator().validate(
            "Спасибо за заботу о нашей работе, будем рады видеть вас снова!",
            Channel::Review,
            "Все пришло вовремя",
        );
        assert!(report.violations.is_empty(), "{:?}", report.violations);
    }

    #[test]
    fn legal_admission_is_blocked_even_in_chat() {
        let report = validator().validate(
            "Мы признаем свою вину и возместим ущерб.",
            Channel::Chat,
            "Товар сломался",
        );
        assert_eq!(report.violations.len(), 2);
        assert!(report
            .violations
            .iter()
            .all(|violation| violation.category == GuardrailCategory::Legal));
    }
}
