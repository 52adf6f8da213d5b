use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::{CollaboratorError, TextPreparer};
use crate::languages::Language;

/// Normalizes a description into narration text: control characters dropped,
/// runs of whitespace collapsed, a closing full stop added when the text ends
/// mid-sentence.
#[derive(Debug, Clone, Default)]
pub struct ScriptNormalizer;

impl ScriptNormalizer {
    pub fn normalize(text: &str) -> String {
        let cleaned: String = text
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        let mut script = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

        if let Some(last) = script.chars().last() {
            if last.is_alphanumeric() {
                script.push('.');
            }
        }
        script
    }
}

#[async_trait]
impl TextPreparer for ScriptNormalizer {
    async fn prepare(&self, text: &str, _language: &Language) -> Result<String, CollaboratorError> {
        let script = Self::normalize(text);
        if script.is_empty() {
            return Err(CollaboratorError::Invalid(
                "description contains no narratable text".to_string(),
            ));
        }
        Ok(script)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Normalizes the description, then translates it through an
/// OpenAI-compatible chat completions endpoint when the target language is
/// not English.
#[derive(Debug, Clone)]
pub struct TranslatingPreparer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl TranslatingPreparer {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    async fn translate(&self, text: &str, language: &Language) -> Result<String, CollaboratorError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.1,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!(
                    "Translate this narration script to {}. Return only the translation:\n\n{}",
                    language.name, text
                ),
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api {
                service: "translation",
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        let translated = reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();

        if translated.is_empty() {
            return Err(CollaboratorError::Invalid(
                "translation service returned no text".to_string(),
            ));
        }
        Ok(translated)
    }
}

#[async_trait]
impl TextPreparer for TranslatingPreparer {
    async fn prepare(&self, text: &str, language: &Language) -> Result<String, CollaboratorError> {
        let script = ScriptNormalizer.prepare(text, language).await?;
        if language.is_english() {
            return Ok(script);
        }

        info!("Translating narration to {} with {}", language.code, self.model);
        let translated = self.translate(&script, language).await?;
        Ok(ScriptNormalizer::normalize(&translated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(
            ScriptNormalizer::normalize("  Bright\tkitchen,\n\n  open plan  "),
            "Bright kitchen, open plan."
        );
    }

    #[test]
    fn test_normalize_keeps_existing_punctuation() {
        assert_eq!(ScriptNormalizer::normalize("Sea views!"), "Sea views!");
        assert_eq!(ScriptNormalizer::normalize("\u{7}\u{1b}"), "");
    }

    #[tokio::test]
    async fn test_prepare_rejects_blank_text() {
        let language = Language::new("en", "English", "nova");
        let err = ScriptNormalizer.prepare(" \n ", &language).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Invalid(_)));
    }
}
