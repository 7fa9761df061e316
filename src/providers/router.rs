//! Provider selection from `provider/model` strings.

use std::sync::Arc;
use std::time::Duration;

use crate::credentials::{resolve_api_key, Credentials};

use super::ollama::OllamaProvider;
use super::openai::OpenAiProvider;
use super::{parse_provider_string, LlmProvider};

/// Provider selection errors.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Model spec is not in `<provider>/<model>` format.
    #[error("invalid model spec '{spec}', expected '<provider>/<model>'")]
    InvalidModelSpec {
        /// Invalid raw spec.
        spec: String,
    },
    /// Unsupported provider type in spec prefix.
    #[error("unsupported provider '{provider}'")]
    UnsupportedProvider {
        /// Unsupported provider prefix.
        provider: String,
    },
    /// Required API credential missing for selected provider.
    #[error("missing credential for provider '{provider}': {key}")]
    MissingCredential {
        /// Provider name.
        provider: String,
        /// Missing credential key.
        key: String,
    },
}

/// Instantiate the completion provider named by `spec`.
///
/// `api_key_env` names the credential consulted for hosted providers.
///
/// # Errors
///
/// Returns [`RouterError`] when the `provider/model` string is malformed, the provider prefix is
/// unknown, or a hosted provider has no API key.
pub fn build_provider(
    spec: &str,
    credentials: &Credentials,
    api_key_env: &str,
    timeout: Duration,
) -> Result<Arc<dyn LlmProvider>, RouterError> {
    let (provider, model) =
        parse_provider_string(spec).map_err(|_| RouterError::InvalidModelSpec {
            spec: spec.to_owned(),
        })?;

    match provider {
        "openai" => {
            let key = resolve_api_key(credentials, api_key_env).ok_or_else(|| {
                RouterError::MissingCredential {
                    provider: provider.to_owned(),
                    key: api_key_env.to_owned(),
                }
            })?;
            Ok(Arc::new(OpenAiProvider::new(
                spec.to_owned(),
                model.to_owned(),
                key,
                timeout,
            )))
        }
        "ollama" => Ok(Arc::new(OllamaProvider::new(
            spec.to_owned(),
            model.to_owned(),
            timeout,
        ))),
        other => Err(RouterError::UnsupportedProvider {
            provider: other.to_owned(),
        }),
    }
}
