//! Name translation through the MyMemory HTTP API.
//!
//! Used to turn romanized passenger names into Hangul before paging.
//! Failures are reported to the user and never touch playback.

use std::sync::Arc;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TranslationConfig;
use crate::error::TranslateError;
use crate::notifier::Notify;

pub struct Translator {
    config: TranslationConfig,
    client: Client,
    notifier: Arc<dyn Notify>,
}

impl Translator {
    pub fn new(config: TranslationConfig, notifier: Arc<dyn Notify>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to configure HTTP client ({e}), using defaults");
                Client::new()
            });

        Self {
            config,
            client,
            notifier,
        }
    }

    /// Translate `text` with the configured language pair (`en|ko` by default).
    /// Every failure is also reported through the notifier.
    pub async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        let result = self.request(text).await;
        if let Err(e) = &result {
            self.notifier
                .alert(&format!("Name translation failed. (Reason: {e})"));
        }
        result
    }

    async fn request(&self, text: &str) -> Result<String, TranslateError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TranslateError::EmptyInput);
        }

        debug!("Translating {text:?} ({})", self.config.langpair);

        let resp = self
            .client
            .get(&self.config.endpoint)
            .query(&[("q", text), ("langpair", self.config.langpair.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(TranslateError::Status(resp.status()));
        }

        let data: Value = resp.json().await?;
        let translated = extract_translation(&data)?;
        debug!("Translated {text:?} → {translated:?}");
        Ok(translated)
    }
}

/// Pull `responseData.translatedText` out of an API response.
fn extract_translation(data: &Value) -> Result<String, TranslateError> {
    data["responseData"]["translatedText"]
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(TranslateError::MissingText)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::testing::RecordingNotifier;
    use serde_json::json;

    fn translator(config: TranslationConfig) -> (Translator, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (Translator::new(config, notifier.clone()), notifier)
    }

    #[test]
    fn test_extracts_translated_text() {
        let data = json!({
            "responseData": { "translatedText": " 홍길동 ", "match": 1 },
            "responseStatus": 200
        });
        assert_eq!(extract_translation(&data).unwrap(), "홍길동");
    }

    #[test]
    fn test_missing_or_empty_text_is_error() {
        let missing = json!({ "responseStatus": 403 });
        assert!(matches!(
            extract_translation(&missing),
            Err(TranslateError::MissingText)
        ));

        let empty = json!({ "responseData": { "translatedText": "" } });
        assert!(matches!(
            extract_translation(&empty),
            Err(TranslateError::MissingText)
        ));
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected_without_request() {
        let (translator, notifier) = translator(TranslationConfig {
            endpoint: "http://127.0.0.1:9/unused".into(),
            ..TranslationConfig::default()
        });
        assert!(matches!(
            translator.translate("   ").await,
            Err(TranslateError::EmptyInput)
        ));
        assert_eq!(
            notifier.messages(),
            vec!["Name translation failed. (Reason: Please enter a name to translate.)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_alerts_user() {
        let (translator, notifier) = translator(TranslationConfig {
            endpoint: "http://127.0.0.1:9/get".into(),
            timeout_secs: 2,
            ..TranslationConfig::default()
        });
        assert!(matches!(
            translator.translate("Hong Gildong").await,
            Err(TranslateError::Request(_))
        ));

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Name translation failed. (Reason: Translation request failed"));
    }
}
