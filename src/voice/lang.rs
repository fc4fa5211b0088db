//! The three-way interface language and its backend mappings

use std::str::FromStr;

/// Interface language selected by the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    /// English
    #[default]
    En,
    /// Hindi
    Hi,
    /// Tamil
    Ta,
}

impl Language {
    /// Recognizer locale for this language
    #[must_use]
    pub const fn locale(self) -> &'static str {
        match self {
            Self::En => "en-US",
            Self::Hi => "hi-IN",
            Self::Ta => "ta-IN",
        }
    }

    /// ISO 639-3 language code expected by the transcription backend
    #[must_use]
    pub const fn stt_code(self) -> &'static str {
        match self {
            Self::En => "eng",
            Self::Hi => "hin",
            Self::Ta => "tam",
        }
    }
}

impl FromStr for Language {
    type Err = std::convert::Infallible;

    /// Unknown values fall back to English rather than failing
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "hi" => Self::Hi,
            "ta" => Self::Ta,
            _ => Self::En,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_mapping() {
        assert_eq!(Language::En.locale(), "en-US");
        assert_eq!(Language::Hi.locale(), "hi-IN");
        assert_eq!(Language::Ta.locale(), "ta-IN");
    }

    #[test]
    fn stt_code_mapping() {
        assert_eq!(Language::En.stt_code(), "eng");
        assert_eq!(Language::Hi.stt_code(), "hin");
        assert_eq!(Language::Ta.stt_code(), "tam");
    }

    #[test]
    fn unknown_tags_default_to_english() {
        assert_eq!("ta".parse::<Language>().unwrap(), Language::Ta);
        assert_eq!("HI".parse::<Language>().unwrap(), Language::Hi);
        assert_eq!("fr".parse::<Language>().unwrap(), Language::En);
        assert_eq!(String::new().parse::<Language>().unwrap(), Language::En);
    }
}
