//! Phrase tables and the channel severity matrix.
//!
//! Tables hold lowercase literal phrases that start and end on a word character so they
//! can be matched on word boundaries. Both `е` and `ё` spellings are listed explicitly.

use serde::{Deserialize, Serialize};

use crate::domain::interaction::Channel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailCategory {
    AiMention,
    Promise,
    Blame,
    Dismissive,
    Legal,
    Jargon,
    UnsolicitedReturn,
    Length,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl GuardrailCategory {
    /// Categories checked by literal phrase lookup, in reporting order.
    pub const PHRASE_CATEGORIES: [GuardrailCategory; 6] = [
        GuardrailCategory::AiMention,
        GuardrailCategory::Legal,
        GuardrailCategory::Promise,
        GuardrailCategory::Blame,
        GuardrailCategory::Dismissive,
        GuardrailCategory::Jargon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiMention => "ai_mention",
            Self::Promise => "promise",
            Self::Blame => "blame",
            Self::Dismissive => "dismissive",
            Self::Legal => "legal",
            Self::Jargon => "jargon",
            Self::UnsolicitedReturn => "unsolicited_return",
            Self::Length => "length",
        }
    }

    /// Severity of a hit in `channel`, or `None` when the category is not checked there.
    pub fn severity(&self, channel: Channel) -> Option<Severity> {
        match (self, channel) {
            (Self::AiMention, _) => Some(Severity::Error),
            (Self::Legal, _) => Some(Severity::Error),
            (Self::Promise, Channel::Review | Channel::Question) => Some(Severity::Error),
            (Self::Promise, Channel::Chat) => None,
            (Self::Blame, Channel::Review | Channel::Question) => Some(Severity::Error),
            (Self::Blame, Channel::Chat) => Some(Severity::Warning),
            (Self::Dismissive, Channel::Review | Channel::Question) => Some(Severity::Error),
            (Self::Dismissive, Channel::Chat) => None,
            (Self::UnsolicitedReturn, Channel::Review | Channel::Question) => {
                Some(Severity::Error)
            }
            (Self::UnsolicitedReturn, Channel::Chat) => None,
            (Self::Jargon, _) => Some(Severity::Warning),
            (Self::Length, _) => Some(Severity::Warning),
        }
    }

    /// Literal phrases for phrase-based categories; empty for computed checks.
    pub fn phrases(&self) -> &'static [&'static str] {
        match self {
            Self::AiMention => AI_MENTION,
            Self::Promise => PROMISE,
            Self::Blame => BLAME,
            Self::Dismissive => DISMISSIVE,
            Self::Legal => LEGAL,
            Self::Jargon => JARGON,
            Self::UnsolicitedReturn | Self::Length => &[],
        }
    }
}

/// Reply length bounds in characters: `(min, max)`.
pub fn length_bounds(channel: Channel) -> (Option<usize>, usize) {
    match channel {
        Channel::Review | Channel::Question => (Some(20), 500),
        Channel::Chat => (None, 1000),
    }
}

const AI_MENTION: &[&str] = &[
    "я бот",
    "бот",
    "бота",
    "ботом",
    "чат-бот",
    "чат бот",
    "нейросеть",
    "нейросети",
    "нейросетью",
    "искусственный интеллект",
    "искусственного интеллекта",
    "как искусственный интеллект",
    "ии",
    "языковая модель",
    "языковой модели",
    "автоответ",
    "автоответчик",
    "автоматический ответ",
    "ответ сгенерирован",
    "сгенерировано автоматически",
    "сгенерирован автоматически",
    "chatgpt",
    "gpt",
    "as an ai",
    "language model",
];

const PROMISE: &[&str] = &[
    "гарантируем возврат денег",
    "гарантируем возврат",
    "гарантируем замену",
    "гарантируем компенсацию",
    "гарантируем",
    "гарантирую",
    "вернем деньги",
    "вернём деньги",
    "вернем всю сумму",
    "вернём всю сумму",
    "обязательно вернем",
    "обязательно вернём",
    "бесплатно заменим",
    "компенсируем",
];

const BLAME: &[&str] = &[
    "вы сами виноваты",
    "сами виноваты",
    "ваша вина",
    "по вашей вине",
    "вы неправильно",
    "надо было читать",
    "нужно было читать",
    "внимательнее читайте",
    "вы не прочитали",
];

const DISMISSIVE: &[&str] = &[
    "обращайтесь в поддержку",
    "обратитесь в поддержку",
    "обратитесь в службу поддержки",
    "пишите в поддержку",
    "напишите в поддержку",
    "обратитесь к маркетплейсу",
    "обращайтесь на маркетплейс",
    "это не к нам",
    "не наша проблема",
];

const LEGAL: &[&str] = &[
    "признаем свою вину",
    "признаём свою вину",
    "признаем вину",
    "признаём вину",
    "подадим в суд",
    "обратимся в суд",
    "в судебном порядке",
    "возместим ущерб",
    "возместим моральный вред",
    "несем полную ответственность",
    "несём полную ответственность",
];

const JARGON: &[&str] = &[
    "fbo",
    "fbs",
    "sku",
    "баркод",
    "селлер",
    "селлера",
    "сортировочный центр",
];

/// Regex fragments for return/refund/exchange wording in a reply.
pub const REPLY_RETURN_TERMS: &[&str] = &[
    r"возврат\w*",
    r"вернуть",
    r"вернем",
    r"вернём",
    r"верните",
    r"вернете",
    r"вернёте",
    r"обмен\w*",
    r"обменя\w*",
    r"замен\w*",
    r"refund\w*",
    r"return\w*",
    r"exchange\w*",
];

/// Regex fragments that show the customer asked about a return themselves.
pub const CUSTOMER_RETURN_TRIGGERS: &[&str] = &[
    r"возврат\w*",
    r"вернуть",
    r"верните",
    r"вернете",
    r"вернёте",
    r"верну",
    r"деньги назад",
    r"обмен\w*",
    r"обменя\w*",
    r"замен\w*",
    r"refund\w*",
    r"return\w*",
    r"exchange\w*",
];

#[cfg(test)]
mod tests {
    use super::{GuardrailCategory, Severity};
    use crate::domain::interaction::Channel;

    #[test]
    fn ai_mentions_are_errors_in_every_channel() {
        for channel in Channel::ALL {
            assert_eq!(GuardrailCategory::AiMention.severity(channel), Some(Severity::Error));
        }
    }

    #[test]
    fn chat_relaxes_public_channel_rules() {
        assert_eq!(GuardrailCategory::Promise.severity(Channel::Chat), None);
        assert_eq!(GuardrailCategory::Dismissive.severity(Channel::Chat), None);
        assert_eq!(GuardrailCategory::UnsolicitedReturn.severity(Channel::Chat), None);
        assert_eq!(GuardrailCategory::Blame.severity(Channel::Chat), Some(Severity::Warning));
        assert_eq!(GuardrailCategory::Blame.severity(Channel::Review), Some(Severity::Error));
    }

    #[test]
    fn tables_are_lowercase_and_word_bounded() {
        for category in GuardrailCategory::PHRASE_CATEGORIES {
            for phrase in category.phrases() {
                assert_eq!(*phrase, phrase.to_lowercase(), "{phrase} must be lowercase");
                let first = phrase.chars().next().expect("non-empty phrase");
                let last = phrase.chars().last().expect("non-empty phrase");
                assert!(first.is_alphanumeric() && last.is_alphanumeric(), "{phrase}");
            }
        }
    }
}
