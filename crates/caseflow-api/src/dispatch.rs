//! Action dispatch through the connector registry.

use async_trait::async_trait;
use caseflow_connectors::{ConnectorError, ConnectorRegistry};
use caseflow_core::{ActionDispatcher, CoreError};
use serde_json::{json, Value};
use std::sync::Arc;

/// Dispatches actions as queries against a named connector.
///
/// The request carries the action as the `op` field so connectors can
/// route it, with the resource and parameters alongside.
pub struct RegistryDispatcher {
    registry: Arc<ConnectorRegistry>,
    connector_id: String,
}

impl RegistryDispatcher {
    pub fn new(registry: Arc<ConnectorRegistry>, connector_id: &str) -> Self {
        Self {
            registry,
            connector_id: connector_id.to_string(),
        }
    }
}

#[async_trait]
impl ActionDispatcher for RegistryDispatcher {
    async fn dispatch(
        &self,
        action: &str,
        resource: &str,
        params: &Value,
    ) -> Result<Value, CoreError> {
        let request = json!({
            "op": action,
            "resource": resource,
            "params": params,
        });

        self.registry
            .query(&self.connector_id, request)
            .await
            .map_err(|e| match e {
                ConnectorError::InvalidRequest(msg) => CoreError::Validation(msg),
                ConnectorError::NotFound(id) => {
                    CoreError::Internal(format!("connector not found: {id}"))
                }
                other => CoreError::TransientExternal(other.to_string()),
            })
    }
}
