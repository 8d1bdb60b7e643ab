//! Model provider implementations for Stride.
//!
//! All providers implement the `stride_core::Provider` trait. The Tier 2
//! orchestrator receives one as `Arc<dyn Provider>`; [`from_config`] builds
//! the default OpenAI-compatible transport.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use stride_config::ProviderConfig;
use stride_core::Provider;
use stride_core::error::ProviderError;

/// Build the configured transport.
///
/// Fails with [`ProviderError::NotConfigured`] when no API key is available.
pub fn from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.as_deref().ok_or_else(|| {
        ProviderError::NotConfigured(
            "no API key: set provider.api_key, STRIDE_API_KEY or OPENAI_API_KEY".into(),
        )
    })?;
    let provider = OpenAiCompatProvider::new("openai_compat", &config.api_url, api_key)?;
    Ok(Arc::new(provider))
}
