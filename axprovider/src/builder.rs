//! Construction of HTTP-backed model clients from provider settings.
//!
//! ```rust
//! use axprovider::{ProviderBuilder, ProviderErrorKind, ProviderKind};
//!
//! let error = ProviderBuilder::new(ProviderKind::Gemini, "  ")
//!     .build()
//!     .err()
//!     .expect("blank key should fail");
//! assert_eq!(error.kind, ProviderErrorKind::Authentication);
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::{ModelProvider, ProviderError, ProviderKind, SecretString};

#[derive(Debug, Clone)]
pub struct ProviderBuilder {
    kind: ProviderKind,
    api_key: SecretString,
    base_url: Option<String>,
    timeout: Duration,
}

impl ProviderBuilder {
    pub fn new(kind: ProviderKind, api_key: impl Into<SecretString>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            base_url: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Arc<dyn ModelProvider>, ProviderError> {
        if self.api_key.is_blank() {
            return Err(ProviderError::authentication(format!(
                "no API key configured for {} provider",
                self.kind
            )));
        }

        match self.kind {
            ProviderKind::Gemini => self.build_gemini(),
            ProviderKind::OpenAi => self.build_openai(),
        }
    }

    #[cfg(feature = "http-transport")]
    fn http_client(&self) -> Result<reqwest::Client, ProviderError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|error| ProviderError::other(format!("failed to build HTTP client: {error}")))
    }

    #[cfg(feature = "provider-gemini")]
    fn build_gemini(self) -> Result<Arc<dyn ModelProvider>, ProviderError> {
        use crate::adapters::gemini::{GeminiHttpTransport, GeminiProvider};

        let mut transport = GeminiHttpTransport::new(self.http_client()?);
        if let Some(base_url) = &self.base_url {
            transport = transport.with_base_url(base_url.clone());
        }

        Ok(Arc::new(GeminiProvider::new(
            self.api_key.clone(),
            Arc::new(transport),
        )))
    }

    #[cfg(not(feature = "provider-gemini"))]
    fn build_gemini(self) -> Result<Arc<dyn ModelProvider>, ProviderError> {
        Err(ProviderError::invalid_request(
            "gemini provider support is not enabled in this build",
        ))
    }

    #[cfg(feature = "provider-openai")]
    fn build_openai(self) -> Result<Arc<dyn ModelProvider>, ProviderError> {
        use crate::adapters::openai::{OpenAiHttpTransport, OpenAiProvider};

        let mut transport = OpenAiHttpTransport::new(self.http_client()?);
        if let Some(base_url) = &self.base_url {
            transport = transport.with_base_url(base_url.clone());
        }

        Ok(Arc::new(OpenAiProvider::new(
            self.api_key.clone(),
            Arc::new(transport),
        )))
    }

    #[cfg(not(feature = "provider-openai"))]
    fn build_openai(self) -> Result<Arc<dyn ModelProvider>, ProviderError> {
        Err(ProviderError::invalid_request(
            "openai provider support is not enabled in this build",
        ))
    }
}

#[cfg(all(test, feature = "provider-gemini", feature = "provider-openai"))]
mod tests {
    use super::*;

    #[test]
    fn builds_each_provider_kind() {
        let gemini = ProviderBuilder::new(ProviderKind::Gemini, "AIza-test")
            .build()
            .expect("gemini client should build");
        assert_eq!(gemini.kind(), ProviderKind::Gemini);

        let openai = ProviderBuilder::new(ProviderKind::OpenAi, "sk-test")
            .base_url("http://localhost:9999/v1")
            .timeout(Duration::from_secs(5))
            .build()
            .expect("openai client should build");
        assert_eq!(openai.kind(), ProviderKind::OpenAi);
    }
}
