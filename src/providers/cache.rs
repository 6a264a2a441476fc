//! Keyed provider cache owned by the composition root.
//!
//! Provider clients are expensive to build (connection pools, auth). The
//! caller that assembles runtimes keeps one `ProviderCache` and asks it for a
//! provider per configuration signature, see
//! [`LlmConfig::signature`](crate::config::LlmConfig::signature).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::providers::types::CompletionProvider;

/// Provider clients keyed by configuration signature.
#[derive(Default)]
pub struct ProviderCache {
    entries: RwLock<HashMap<String, Arc<dyn CompletionProvider>>>,
}

impl ProviderCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached provider for `signature`, building it on first use.
    ///
    /// A failing factory leaves the cache untouched.
    pub async fn get_or_insert_with<F>(
        &self,
        signature: &str,
        factory: F,
    ) -> Result<Arc<dyn CompletionProvider>>
    where
        F: FnOnce() -> Result<Arc<dyn CompletionProvider>>,
    {
        if let Some(provider) = self.entries.read().await.get(signature) {
            return Ok(Arc::clone(provider));
        }

        let mut entries = self.entries.write().await;
        if let Some(provider) = entries.get(signature) {
            return Ok(Arc::clone(provider));
        }
        let provider = factory()?;
        debug!(signature = %signature, provider = provider.name(), "Caching provider client");
        entries.insert(signature.to_string(), Arc::clone(&provider));
        Ok(provider)
    }

    /// Number of cached providers.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every cached provider.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::providers::ScriptedProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_reuses_provider_per_signature() {
        let cache = ProviderCache::new();
        let built = AtomicUsize::new(0);
        let factory = || -> Result<Arc<dyn CompletionProvider>> {
            built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ScriptedProvider::new()))
        };

        let a = cache.get_or_insert_with("gpt|responses", factory).await.unwrap();
        let b = cache
            .get_or_insert_with("gpt|responses", || -> Result<Arc<dyn CompletionProvider>> {
                built.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(ScriptedProvider::new()))
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_factory_error_is_not_cached() {
        let cache = ProviderCache::new();
        let result = cache
            .get_or_insert_with("bad", || Err(RelayError::Config("no api key".into())))
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);

        cache
            .get_or_insert_with("ok", || Ok(Arc::new(ScriptedProvider::new()) as Arc<dyn CompletionProvider>))
            .await
            .unwrap();
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
