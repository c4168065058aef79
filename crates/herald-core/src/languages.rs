//! Languages the hub can render announcements in.

use crate::announcement::{LanguageCode, Variant};

pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub flag: &'static str,
}

impl Language {
    pub fn code(&self) -> LanguageCode {
        LanguageCode::from(self.code)
    }

    /// A variant of this language carrying `text`.
    pub fn variant(&self, text: impl Into<String>) -> Variant {
        Variant::new(self.code, self.name, self.flag, text)
    }
}

pub const LANGUAGES: &[Language] = &[
    Language { code: "en", name: "English", flag: "🇬🇧" },
    Language { code: "hi", name: "हिन्दी (Hindi)", flag: "🇮🇳" },
    Language { code: "es", name: "Español (Spanish)", flag: "🇪🇸" },
    Language { code: "fr", name: "Français (French)", flag: "🇫🇷" },
    Language { code: "ta", name: "தமிழ் (Tamil)", flag: "🇮🇳" },
];

pub fn lookup(code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.code == code)
}

pub fn is_supported(code: &str) -> bool {
    lookup(code).is_some()
}
