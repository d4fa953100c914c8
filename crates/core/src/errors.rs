use thiserror::Error;

/// Failure classes that reach the outer surfaces (CLI, demos).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("generation backend failure: {0}")]
    Backend(String),
    #[error("integration failure: {0}")]
    Integration(String),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "config_validation",
            Self::Backend(_) => "generation_backend",
            Self::Integration(_) => "integration",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Backend(_) => 4,
            Self::Integration(_) => 5,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Configuration(_) => {
                "The agents are not configured. Check credentials and settings, then retry."
            }
            Self::Backend(_) => {
                "The language model backend is unavailable. Please retry shortly."
            }
            Self::Integration(_) => "An external service failed during the conversation.",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ApplicationError;

    #[test]
    fn configuration_error_maps_to_config_class() {
        let error = ApplicationError::Configuration("missing api key".to_owned());
        assert_eq!(error.error_class(), "config_validation");
        assert_eq!(error.exit_code(), 2);
        assert!(error.to_string().contains("missing api key"));
    }

    #[test]
    fn backend_error_has_user_safe_message() {
        let error = ApplicationError::Backend("HTTP 500 from upstream".to_owned());
        assert_eq!(error.error_class(), "generation_backend");
        assert_eq!(
            error.user_message(),
            "The language model backend is unavailable. Please retry shortly."
        );
        assert!(!error.user_message().contains("500"));
    }

    #[test]
    fn integration_error_uses_distinct_exit_code() {
        let error = ApplicationError::Integration("geocoding status ZERO_RESULTS".to_owned());
        assert_eq!(error.exit_code(), 5);
        assert_ne!(error.exit_code(), ApplicationError::Backend(String::new()).exit_code());
    }
}
