use agent_provider::ModelProvider;
use agent_provider_chat_api::{ChatApiProvider, ChatApiProviderConfig, CHAT_API_PROVIDER_ID};
use agent_provider_mock::{MockProvider, MOCK_PROVIDER_ID};

use crate::config::AgentConfig;

pub const DEFAULT_PROVIDER_ID: &str = CHAT_API_PROVIDER_ID;

/// Builds the provider named by `config.provider`.
pub fn provider_for_config(config: &AgentConfig) -> Result<Box<dyn ModelProvider>, String> {
    match config.provider.trim() {
        CHAT_API_PROVIDER_ID => {
            let mut provider_config =
                ChatApiProviderConfig::new(config.api_key.clone().unwrap_or_default())
                    .with_timeout(config.request_timeout);
            if let Some(base_url) = &config.base_url {
                provider_config = provider_config.with_base_url(base_url.clone());
            }
            let provider = ChatApiProvider::new(provider_config)
                .map_err(|error| format!("Failed to initialize provider: {error}"))?;
            Ok(Box::new(provider))
        }
        MOCK_PROVIDER_ID => Ok(Box::new(MockProvider::echo())),
        unknown => Err(format!(
            "Unsupported provider '{unknown}'. Available providers: {CHAT_API_PROVIDER_ID}, {MOCK_PROVIDER_ID}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(provider: &str) -> AgentConfig {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AgentConfig::from_sources(&Default::default(), |_| None, dir.path())
            .expect("config should build");
        config.provider = provider.to_string();
        config
    }

    #[test]
    fn provider_for_config_supports_mock() {
        let provider = provider_for_config(&config_for("mock")).expect("mock provider should resolve");
        assert_eq!(provider.profile().provider_id, "mock");
    }

    #[test]
    fn provider_for_config_supports_chat_api() {
        let mut config = config_for("chat-api");
        config.base_url = Some("http://127.0.0.1:9/v1".to_string());

        let provider = provider_for_config(&config).expect("chat-api provider should resolve");
        let profile = provider.profile();

        assert_eq!(profile.provider_id, "chat-api");
        assert_eq!(
            profile.endpoint.as_deref(),
            Some("http://127.0.0.1:9/v1/chat/completions")
        );
    }

    #[test]
    fn provider_for_config_rejects_unknown_provider() {
        let error = match provider_for_config(&config_for("custom")) {
            Ok(_) => panic!("unknown providers should fail"),
            Err(error) => error,
        };

        assert!(error.contains("Unsupported provider 'custom'"));
    }
}
