use std::sync::Arc;

use tracing::{info, warn};
use twinquery_core::config::StoreConfig;

use crate::cosmos::{CosmosDocumentStore, CosmosSettings};
use crate::store::{DocumentStore, StoreError};

/// Builds the live store client, or `None` when the store is not configured
/// and callers should run in mock mode.
pub fn connect(config: &StoreConfig) -> Result<Option<Arc<dyn DocumentStore>>, StoreError> {
    let (Some(endpoint), Some(key)) = (config.endpoint.as_ref(), config.key.as_ref()) else {
        warn!(
            event_name = "system.store.mock_mode",
            database = %config.database,
            "no document store configured; queries will return mock data"
        );
        return Ok(None);
    };
    if !config.is_configured() {
        warn!(
            event_name = "system.store.mock_mode",
            database = %config.database,
            "document store settings are blank; queries will return mock data"
        );
        return Ok(None);
    }

    let store = CosmosDocumentStore::new(CosmosSettings {
        endpoint: endpoint.clone(),
        key: key.clone(),
        database: config.database.clone(),
        timeout_secs: config.timeout_secs,
    })?;
    info!(
        event_name = "system.store.connected",
        database = %config.database,
        "document store client initialized"
    );

    Ok(Some(Arc::new(store)))
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use twinquery_core::config::AppConfig;

    use super::connect;
    use crate::store::DocumentStore;

    #[test]
    fn unconfigured_store_selects_mock_mode() {
        let config = AppConfig::default();

        let store = connect(&config.store).expect("mock mode is not an error");

        assert!(store.is_none());
    }

    #[test]
    fn configured_store_builds_client() {
        let mut config = AppConfig::default();
        config.store.endpoint = Some("https://twins.documents.azure.com:443/".to_string());
        config.store.key = Some(SecretString::from("c2VjcmV0LWtleQ==".to_string()));

        let store = connect(&config.store).expect("client builds").expect("live store");

        assert_eq!(store.database(), "TwinHumanDB");
    }
}
