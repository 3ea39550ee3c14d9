use super::chat::api::ListModelsResponse;
use super::chat::model::GeminiChatModel;
use crate::client::Client;
use crate::{ChatModel, ModelProvider};
use async_trait::async_trait;
use reqwest::header;
use std::sync::Arc;

pub struct GeminiProvider {
    client: Client,
    base_url: String,
}

const API_VERSION: &str = "v1beta";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

impl GeminiProvider {
    pub fn new(api_key: &str) -> anyhow::Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    /// Create a provider with a custom base URL (e.g., for proxying).
    /// The API version path (/v1beta) is automatically appended.
    pub fn with_base_url(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let mut key = header::HeaderValue::from_str(api_key)
            .map_err(|_| anyhow::anyhow!("API key contains characters not allowed in a header"))?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);

        let base_url = base_url.trim_end_matches('/');
        Ok(GeminiProvider {
            client: Client::with_headers(headers)?,
            base_url: format!("{}/{}", base_url, API_VERSION),
        })
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn list_models(&self) -> anyhow::Result<Vec<crate::ModelDefinition>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = match &page_token {
                Some(token) => format!("{}/models?pageToken={}", self.base_url, token),
                None => format!("{}/models", self.base_url),
            };
            let response: ListModelsResponse = self.client.get(&url).await?;
            models.extend(response.models.into_iter().map(crate::ModelDefinition::from));
            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(models)
    }

    fn create_chat_model(&self, model_name: &str) -> Option<Arc<dyn ChatModel + Send + Sync>> {
        Some(Arc::new(GeminiChatModel::new(
            self.client.clone(),
            self.base_url.clone(),
            model_name.to_string(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_appended_once() {
        let provider = GeminiProvider::with_base_url("http://localhost:8080/", "key").unwrap();
        assert_eq!(provider.base_url, "http://localhost:8080/v1beta");
    }

    #[test]
    fn test_bad_key_is_rejected() {
        assert!(GeminiProvider::new("bad\nkey").is_err());
    }

    #[test]
    fn test_create_chat_model_keeps_name() {
        let provider = GeminiProvider::new("key").unwrap();
        let model = provider.create_chat_model("gemini-2.0-flash").unwrap();
        assert_eq!(model.name(), "gemini-2.0-flash");
    }
}
