//! Shared services handed to every floor component.

use crate::error::Result;
use keybus_core::GatewayConfig;
use keybus_hardware::{LineOpener, SerialOpener};
use keybus_storage::Store;
use std::fmt;
use std::sync::Arc;

/// Configuration, store and line opener, built once at startup.
#[derive(Clone)]
pub struct GatewayContext {
    config: GatewayConfig,
    store: Store,
    opener: Arc<dyn LineOpener>,
}

impl GatewayContext {
    pub fn new(config: GatewayConfig, store: Store, opener: Arc<dyn LineOpener>) -> Self {
        Self {
            config,
            store,
            opener,
        }
    }

    /// Open the configured store and use real serial lines.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or migrated.
    pub async fn open(config: GatewayConfig) -> Result<Self> {
        let store = Store::open(&config.storage).await?;
        Ok(Self::new(config, store, Arc::new(SerialOpener::default())))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn opener(&self) -> &dyn LineOpener {
        self.opener.as_ref()
    }
}

impl fmt::Debug for GatewayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayContext")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
