use serde::{Deserialize, Serialize};
use std::fmt;

/// Response languages offered to the user.
///
/// Each language carries the greeting that opens a fresh conversation and the
/// script the assistant must answer in. English is the default wherever a
/// name cannot be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Hindi,
    Marathi,
    Tamil,
    Telugu,
    Kannada,
    Malayalam,
    Bengali,
    Gujarati,
}

impl Language {
    pub const ALL: [Language; 9] = [
        Language::English,
        Language::Hindi,
        Language::Marathi,
        Language::Tamil,
        Language::Telugu,
        Language::Kannada,
        Language::Malayalam,
        Language::Bengali,
        Language::Gujarati,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Hindi => "hindi",
            Language::Marathi => "marathi",
            Language::Tamil => "tamil",
            Language::Telugu => "telugu",
            Language::Kannada => "kannada",
            Language::Malayalam => "malayalam",
            Language::Bengali => "bengali",
            Language::Gujarati => "gujarati",
        }
    }

    /// ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
            Language::Marathi => "mr",
            Language::Tamil => "ta",
            Language::Telugu => "te",
            Language::Kannada => "kn",
            Language::Malayalam => "ml",
            Language::Bengali => "bn",
            Language::Gujarati => "gu",
        }
    }

    pub fn english_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Marathi => "Marathi",
            Language::Tamil => "Tamil",
            Language::Telugu => "Telugu",
            Language::Kannada => "Kannada",
            Language::Malayalam => "Malayalam",
            Language::Bengali => "Bengali",
            Language::Gujarati => "Gujarati",
        }
    }

    pub fn native_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "हिंदी",
            Language::Marathi => "मराठी",
            Language::Tamil => "தமிழ்",
            Language::Telugu => "తెలుగు",
            Language::Kannada => "ಕನ್ನಡ",
            Language::Malayalam => "മലയാളം",
            Language::Bengali => "বাংলা",
            Language::Gujarati => "ગુજરાતી",
        }
    }

    /// Selector label, e.g. `हिंदी (Hindi)`.
    pub fn label(&self) -> String {
        match self {
            Language::English => "English".to_string(),
            other => format!("{} ({})", other.native_name(), other.english_name()),
        }
    }

    /// Writing system the assistant must answer in. `None` leaves English
    /// unconstrained.
    pub fn script(&self) -> Option<&'static str> {
        match self {
            Language::English => None,
            Language::Hindi | Language::Marathi => Some("Devanagari"),
            Language::Tamil => Some("Tamil"),
            Language::Telugu => Some("Telugu"),
            Language::Kannada => Some("Kannada"),
            Language::Malayalam => Some("Malayalam"),
            Language::Bengali => Some("Bengali"),
            Language::Gujarati => Some("Gujarati"),
        }
    }

    pub fn greeting(&self) -> &'static str {
        match self {
            Language::English => "Hello! I'm your health assistant. How can I help you today?",
            Language::Hindi => "नमस्ते! मैं आपका स्वास्थ्य सहायक हूं। मैं आज आपकी कैसे मदद कर सकता हूं?",
            Language::Marathi => "नमस्कार! मी तुमचा आरोग्य सहाय्यक आहे. आज मी तुम्हाला कशी मदत करू शकतो?",
            Language::Tamil => "வணக்கம்! நான் உங்கள் சுகாதார உதவியாளர். இன்று நான் உங்களுக்கு எப்படி உதவ முடியும்?",
            Language::Telugu => "నమస్కారం! నేను మీ ఆరోగ్య సహాయకుడిని. ఈరోజు నేను మీకు ఎలా సహాయం చేయగలను?",
            Language::Kannada => "ನಮಸ್ಕಾರ! ನಾನು ನಿಮ್ಮ ಆರೋಗ್ಯ ಸಹಾಯಕ. ಇಂದು ನಾನು ನಿಮಗೆ ಹೇಗೆ ಸಹಾಯ ಮಾಡಬಹುದು?",
            Language::Malayalam => "നമസ്കാരം! ഞാൻ നിങ്ങളുടെ ആരോഗ്യ സഹായിയാണ്. ഇന്ന് ഞാൻ നിങ്ങളെ എങ്ങനെ സഹായിക്കും?",
            Language::Bengali => "নমস্কার! আমি আপনার স্বাস্থ্য সহকারী। আজ আমি আপনাকে কীভাবে সাহায্য করতে পারি?",
            Language::Gujarati => "નમસ્તે! હું તમારો આરોગ્ય સહાયક છું. આજે હું તમારી કેવી રીતે મદદ કરી શકું?",
        }
    }

    /// Hard response-language directive injected into the system prompt.
    pub fn directive(&self) -> String {
        match self.script() {
            None => format!(
                "Respond ONLY in {}. Do not use any other language.",
                self.english_name()
            ),
            Some(script) => format!(
                "Respond ONLY in {} ({}). Use {} script. Do not use any other language.",
                self.english_name(),
                self.native_name(),
                script
            ),
        }
    }

    pub fn from_name(name: &str) -> Option<Language> {
        let needle = name.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == needle || lang.code() == needle)
    }

    /// Accepts a name or ISO code; anything else is english.
    pub fn parse_or_default(name: &str) -> Language {
        match Self::from_name(name) {
            Some(lang) => lang,
            None => {
                tracing::debug!("Unrecognised language {:?}; using english", name);
                Language::English
            }
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
