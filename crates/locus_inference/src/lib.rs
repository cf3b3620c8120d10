use locus_core::{ArticleGenerator, Error, Result};
use std::sync::Arc;

pub mod models;

pub use models::dummy::DummyModel;
pub use models::prompt_server::{PromptNames, PromptServerConfig, PromptServerModel};

/// Which generator adapter to build, plus what the HTTP adapter needs.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub model: Option<String>,
    pub prompt_server: PromptServerConfig,
}

/// Builds the generator named by `config.model` ("dummy" when unset).
pub fn create_model(config: Config) -> Result<Arc<dyn ArticleGenerator>> {
    match config.model.as_deref().unwrap_or("dummy") {
        "dummy" => Ok(Arc::new(DummyModel::new())),
        "prompt-server" => Ok(Arc::new(PromptServerModel::new(config.prompt_server)?)),
        other => Err(Error::Generator(format!(
            "unknown model '{}' (expected dummy or prompt-server)",
            other
        ))),
    }
}

pub mod prelude {
    pub use super::{create_model, Config, DummyModel, PromptServerConfig, PromptServerModel};
    pub use locus_core::{ArticleGenerator, Error, Result};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_default_model() {
        let model = create_model(Config::default()).unwrap();
        assert_eq!(model.name(), "dummy");
    }

    #[test]
    fn test_create_prompt_server_requires_url() {
        let config = Config {
            model: Some("prompt-server".to_string()),
            ..Config::default()
        };
        assert!(create_model(config).is_err());
    }

    #[test]
    fn test_unknown_model() {
        let config = Config {
            model: Some("gpt-sideways".to_string()),
            ..Config::default()
        };
        let err = create_model(config).unwrap_err();
        assert!(err.to_string().contains("unknown model"));
    }
}
