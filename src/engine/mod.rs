pub mod consume;
pub mod lifecycle;
pub mod users;

use std::sync::Arc;

use chrono::Utc;

use crate::{config::PasswordlessConfig, magic_link::MagicLinkBuilder, store::CodeStore};

/// The passwordless engine proper. Stateless between calls; all durable
/// state lives behind the store, which owns atomicity for every
/// invariant-bearing write.
pub struct PasswordlessEngine {
    store: Arc<dyn CodeStore>,
    config: PasswordlessConfig,
}

impl PasswordlessEngine {
    pub fn new(store: Arc<dyn CodeStore>, config: PasswordlessConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PasswordlessConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn CodeStore {
        self.store.as_ref()
    }

    pub(crate) fn magic_links(&self) -> MagicLinkBuilder {
        MagicLinkBuilder::new(self.config.link_base_url.as_str())
    }

    pub(crate) fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::{config::PasswordlessConfig, store::RocksStore};

    use super::PasswordlessEngine;

    pub(crate) fn engine_with(config: PasswordlessConfig) -> PasswordlessEngine {
        let dir = std::env::temp_dir().join(format!("codelink-engine-{}", Uuid::new_v4()));
        let store = RocksStore::new(dir.to_str().unwrap()).unwrap();
        PasswordlessEngine::new(Arc::new(store), config)
    }

    pub(crate) fn engine() -> PasswordlessEngine {
        engine_with(PasswordlessConfig::default())
    }
}
