use crate::config::Config;
use crate::error::{Result, OfferdexError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_ingest(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(OfferdexError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        if embedding.endpoint.trim().is_empty() {
            errors.push(ValidationError::new(
                "embedding.endpoint",
                "Provider endpoint cannot be empty",
            ));
        }
        if embedding.model.trim().is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
        if embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }
        if embedding.api_key_env.trim().is_empty() {
            errors.push(ValidationError::new(
                "embedding.api_key_env",
                "API key environment variable name cannot be empty",
            ));
        }
        if embedding.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_secs",
                "Request timeout must be greater than 0",
            ));
        }
        if embedding.max_attempts == 0 {
            errors.push(ValidationError::new(
                "embedding.max_attempts",
                "Attempt budget must be at least 1",
            ));
        }
    }

    fn validate_ingest(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.ingest.batch_size == 0 {
            errors.push(ValidationError::new(
                "ingest.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut config = Config::default();
        config.embedding.model = String::new();
        config.embedding.dimension = 0;
        config.ingest.batch_size = 0;

        match ConfigValidator::validate(&config) {
            Err(OfferdexError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 3);
            }
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }
}
