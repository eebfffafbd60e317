//! Request parameters and the fixed prompts sent to the vision model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{ChatMessage, Decoding};

/// Token budget for the insights variant.
pub const INSIGHTS_MAX_TOKENS: u32 = 512;
/// Token budget for the question-answering variant.
pub const QUESTION_MAX_TOKENS: u32 = 1024;

const INSIGHTS_SYSTEM_PROMPT: &str = "You are an image insights generator. \
    You look at the provided image and describe what it shows: subjects, setting, \
    text, colors and anything notable. \
    You are a helpful, respectful assistant and you never produce harmful or offensive content.";

const QUESTION_SYSTEM_PROMPT: &str = "You are an image question answering assistant. \
    You answer the user's question using only what can be seen in the provided image. \
    You are a helpful, respectful assistant and you never produce harmful or offensive content.";

/// Output language for the insights variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Spanish,
    German,
    French,
    Portuguese,
    Italian,
    Hindi,
    Thai,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::English,
        Language::Spanish,
        Language::German,
        Language::French,
        Language::Portuguese,
        Language::Italian,
        Language::Hindi,
        Language::Thai,
    ];

    /// Wire value used in the multipart form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Spanish => "spanish",
            Language::German => "german",
            Language::French => "french",
            Language::Portuguese => "portuguese",
            Language::Italian => "italian",
            Language::Hindi => "hindi",
            Language::Thai => "thai",
        }
    }

    /// Name interpolated into the prompt.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Spanish",
            Language::German => "German",
            Language::French => "French",
            Language::Portuguese => "Portuguese",
            Language::Italian => "Italian",
            Language::Hindi => "Hindi",
            Language::Thai => "Thai",
        }
    }
}

/// Desired length of the generated insights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Length {
    Short,
    #[default]
    Medium,
    Long,
}

impl Length {
    pub const ALL: [Length; 3] = [Length::Short, Length::Medium, Length::Long];

    pub fn as_str(&self) -> &'static str {
        match self {
            Length::Short => "short",
            Length::Medium => "medium",
            Length::Long => "long",
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            Length::Short => "short (two or three sentences)",
            Length::Medium => "medium length (one or two paragraphs)",
            Length::Long => "long and detailed (several paragraphs)",
        }
    }
}

/// Raised when a form value is outside its enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseParamError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Language {
    type Err = ParseParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|lang| lang.as_str() == wanted)
            .ok_or_else(|| ParseParamError {
                kind: "language",
                value: s.to_string(),
            })
    }
}

impl FromStr for Length {
    type Err = ParseParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Length::ALL
            .into_iter()
            .find(|len| len.as_str() == wanted)
            .ok_or_else(|| ParseParamError {
                kind: "length",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user asked for. The two UI variants are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightRequest {
    Insights { language: Language, length: Length },
    Question(String),
}

impl InsightRequest {
    /// System and user messages for this request.
    pub fn messages(&self) -> Vec<ChatMessage> {
        match self {
            InsightRequest::Insights { language, length } => vec![
                ChatMessage::system(INSIGHTS_SYSTEM_PROMPT),
                ChatMessage::user(format!(
                    "Generate insights about this image in {}. The response should be {}.",
                    language.display_name(),
                    length.guidance()
                )),
            ],
            InsightRequest::Question(question) => vec![
                ChatMessage::system(QUESTION_SYSTEM_PROMPT),
                ChatMessage::user(question.clone()),
            ],
        }
    }

    pub fn decoding(&self) -> Decoding {
        let max_tokens = match self {
            InsightRequest::Insights { .. } => INSIGHTS_MAX_TOKENS,
            InsightRequest::Question(_) => QUESTION_MAX_TOKENS,
        };
        Decoding {
            temperature: 0.0,
            max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    #[test]
    fn parses_every_language_case_insensitively() {
        for lang in Language::ALL {
            assert_eq!(lang.as_str().parse::<Language>().unwrap(), lang);
            assert_eq!(
                lang.as_str().to_uppercase().parse::<Language>().unwrap(),
                lang
            );
        }
        assert!("klingon".parse::<Language>().is_err());
    }

    #[test]
    fn rejects_unknown_length() {
        let err = "huge".parse::<Length>().unwrap_err();
        assert_eq!(err.kind, "length");
        assert_eq!(err.to_string(), "unknown length: \"huge\"");
    }

    #[test]
    fn insights_prompt_embeds_language_and_length() {
        let request = InsightRequest::Insights {
            language: Language::German,
            length: Length::Short,
        };
        let messages = request.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("German"));
        assert!(messages[1].content.contains("short"));
        assert_eq!(request.decoding().max_tokens, 512);
        assert_eq!(request.decoding().temperature, 0.0);
    }

    #[test]
    fn question_prompt_is_verbatim() {
        let request = InsightRequest::Question("  What color is the car?".into());
        let messages = request.messages();
        assert_eq!(messages[1].content, "  What color is the car?");
        assert!(messages[0].content.contains("question answering"));
        assert_eq!(request.decoding().max_tokens, 1024);
    }
}
