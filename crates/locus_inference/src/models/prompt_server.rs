use async_trait::async_trait;
use chrono::Utc;
use locus_core::{
    ArticleDraft, ArticleGenerator, Error, Outline, ProducerRequest, Result, RevisionFeedback,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Prompt identifiers registered on the prompt server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptNames {
    pub outline: String,
    pub draft: String,
    pub revise: String,
}

impl Default for PromptNames {
    fn default() -> Self {
        Self {
            outline: "seo-outline".to_string(),
            draft: "seo-article".to_string(),
            revise: "seo-revise".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct PromptServerConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub prompt_version: String,
    pub prompts: PromptNames,
    pub timeout: Duration,
}

impl Default for PromptServerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            prompt_version: "v1".to_string(),
            prompts: PromptNames::default(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl fmt::Debug for PromptServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptServerConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("prompt_version", &self.prompt_version)
            .field("prompts", &self.prompts)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    input: &'a Value,
}

#[derive(Deserialize)]
struct PromptResponse {
    output: Option<Value>,
}

/// Runs named prompts on a remote server. The server owns prompt text and
/// model choice; this side only ships structured input and parses
/// structured output.
pub struct PromptServerModel {
    client: Arc<Client>,
    base_url: Url,
    api_key: Option<String>,
    prompt_version: String,
    prompts: PromptNames,
}

impl fmt::Debug for PromptServerModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptServerModel")
            .field("client", &"<reqwest::Client>")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("prompt_version", &self.prompt_version)
            .finish()
    }
}

impl PromptServerModel {
    pub fn new(config: PromptServerConfig) -> Result<Self> {
        let raw = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::InvalidUrl("prompt server URL is required".to_string()))?;
        let mut base_url = Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client: Arc::new(client),
            base_url,
            api_key: config.api_key,
            prompt_version: config.prompt_version,
            prompts: config.prompts,
        })
    }

    pub fn endpoint(&self, prompt: &str) -> Result<Url> {
        self.base_url
            .join(&format!("prompts/{}", prompt))
            .map_err(|e| Error::InvalidUrl(format!("prompt {}: {}", prompt, e)))
    }

    fn common_input(&self, request: &ProducerRequest, language: &str) -> Value {
        json!({
            "topic": request.topic,
            "city": request.city,
            "keyword": request.keyword,
            "language": language,
            "promptVersion": self.prompt_version,
            "nowIso": Utc::now().to_rfc3339(),
        })
    }

    async fn run_prompt<T: DeserializeOwned>(&self, prompt: &str, input: Value) -> Result<T> {
        let endpoint = self.endpoint(prompt)?;
        tracing::debug!(prompt, endpoint = %endpoint, "calling prompt server");

        let mut builder = self.client.post(endpoint).json(&PromptRequest { input: &input });
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await?
            .error_for_status()?
            .json::<PromptResponse>()
            .await?;

        let output = response
            .output
            .filter(|v| !v.is_null())
            .ok_or_else(|| Error::Generator(format!("prompt {} returned empty output", prompt)))?;

        serde_json::from_value(output).map_err(|e| Error::Schema(format!("prompt {} output: {}", prompt, e)))
    }
}

#[async_trait]
impl ArticleGenerator for PromptServerModel {
    fn name(&self) -> &str {
        "prompt-server"
    }

    async fn generate_outline(&self, request: &ProducerRequest, language: &str) -> Result<Outline> {
        let input = self.common_input(request, language);
        self.run_prompt(&self.prompts.outline, input).await
    }

    async fn generate_draft(
        &self,
        outline: &Outline,
        request: &ProducerRequest,
        language: &str,
    ) -> Result<ArticleDraft> {
        let mut input = self.common_input(request, language);
        input["outlineJson"] = Value::String(serde_json::to_string(outline)?);
        self.run_prompt(&self.prompts.draft, input).await
    }

    async fn revise_draft(
        &self,
        draft: &ArticleDraft,
        feedback: &RevisionFeedback,
        language: &str,
    ) -> Result<ArticleDraft> {
        let input = json!({
            "language": language,
            "nowIso": Utc::now().to_rfc3339(),
            "originalArticleJson": serde_json::to_string(draft)?,
            "failureCodesJson": serde_json::to_string(&feedback.failure_codes)?,
            "failureMessagesJson": serde_json::to_string(&feedback.failure_messages)?,
            "qualitySummaryJson": serde_json::to_string(&feedback.score)?,
        });
        self.run_prompt(&self.prompts.revise, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> PromptServerConfig {
        PromptServerConfig {
            base_url: Some(base.to_string()),
            api_key: Some("secret-key".to_string()),
            ..PromptServerConfig::default()
        }
    }

    #[test]
    fn test_requires_base_url() {
        let err = PromptServerModel::new(PromptServerConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
        assert!(PromptServerModel::new(config("not a url")).is_err());
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let model = PromptServerModel::new(config("http://localhost:3400/api")).unwrap();
        assert_eq!(
            model.endpoint("seo-outline").unwrap().as_str(),
            "http://localhost:3400/api/prompts/seo-outline"
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let model = PromptServerModel::new(config("http://localhost:3400")).unwrap();
        let rendered = format!("{:?}", model);
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<redacted>"));
        assert!(!format!("{:?}", config("http://x")).contains("secret-key"));
    }

    #[test]
    fn test_common_input_fields() {
        let model = PromptServerModel::new(config("http://localhost:3400")).unwrap();
        let request = ProducerRequest::new("Electronics Recycling", "Austin", "electronics recycling austin");
        let input = model.common_input(&request, "en");
        assert_eq!(input["city"], "Austin");
        assert_eq!(input["promptVersion"], "v1");
        assert!(input["nowIso"].is_string());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let mut cfg = config("http://127.0.0.1:9");
        cfg.timeout = Duration::from_millis(200);
        let model = PromptServerModel::new(cfg).unwrap();
        let request = ProducerRequest::new("Tires", "Austin", "tire disposal");
        assert!(model.generate_outline(&request, "en").await.is_err());
    }
}
