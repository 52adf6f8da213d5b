use serde::{Deserialize, Serialize};

/// A narration language and the TTS voice used for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    pub name: String,
    #[serde(rename = "tts_voice")]
    pub voice: String,
}

impl Language {
    pub fn new(code: &str, name: &str, voice: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            voice: voice.to_string(),
        }
    }

    pub fn is_english(&self) -> bool {
        self.code == "en"
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("language entry `{0}` must look like code:name:voice")]
    Malformed(String),

    #[error("language code `{0}` must be two lowercase letters")]
    BadCode(String),

    #[error("language `{0}` is listed twice")]
    Duplicate(String),

    #[error("at least one language must be supported")]
    Empty,
}

/// The fixed set of languages submissions are validated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageCatalog {
    languages: Vec<Language>,
}

pub const DEFAULT_LANGUAGES: &str = "en:English:nova,te:Telugu:onyx";

impl Default for LanguageCatalog {
    fn default() -> Self {
        Self {
            languages: vec![
                Language::new("en", "English", "nova"),
                Language::new("te", "Telugu", "onyx"),
            ],
        }
    }
}

impl LanguageCatalog {
    /// Parse a comma separated `code:name:voice` list.
    pub fn parse(list: &str) -> Result<Self, CatalogError> {
        let mut languages: Vec<Language> = Vec::new();

        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [code, name, voice] = parts[..] else {
                return Err(CatalogError::Malformed(entry.to_string()));
            };
            if name.is_empty() || voice.is_empty() {
                return Err(CatalogError::Malformed(entry.to_string()));
            }
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_lowercase()) {
                return Err(CatalogError::BadCode(code.to_string()));
            }
            if languages.iter().any(|l| l.code == code) {
                return Err(CatalogError::Duplicate(code.to_string()));
            }
            languages.push(Language::new(code, name, voice));
        }

        if languages.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { languages })
    }

    pub fn get(&self, code: &str) -> Option<&Language> {
        self.languages.iter().find(|l| l.code == code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn all(&self) -> &[Language] {
        &self.languages
    }

    pub fn codes(&self) -> Vec<&str> {
        self.languages.iter().map(|l| l.code.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_default_languages() {
        assert_eq!(
            LanguageCatalog::parse(DEFAULT_LANGUAGES).unwrap(),
            LanguageCatalog::default()
        );
    }

    #[test]
    fn test_parse_custom_catalog() {
        let catalog = LanguageCatalog::parse(" en:English:nova , es:Spanish:alloy ").unwrap();
        assert_eq!(catalog.codes(), vec!["en", "es"]);
        assert_eq!(catalog.get("es").unwrap().voice, "alloy");
        assert!(!catalog.contains("te"));
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert_eq!(
            LanguageCatalog::parse("en:English"),
            Err(CatalogError::Malformed("en:English".into()))
        );
        assert_eq!(
            LanguageCatalog::parse("EN:English:nova"),
            Err(CatalogError::BadCode("EN".into()))
        );
        assert_eq!(
            LanguageCatalog::parse("en:English:nova,en:Other:onyx"),
            Err(CatalogError::Duplicate("en".into()))
        );
        assert_eq!(LanguageCatalog::parse(" , "), Err(CatalogError::Empty));
    }

    #[test]
    fn test_language_serializes_voice_as_tts_voice() {
        let json = serde_json::to_value(Language::new("te", "Telugu", "onyx")).unwrap();
        assert_eq!(json["tts_voice"], "onyx");
        assert_eq!(json["code"], "te");
    }
}
