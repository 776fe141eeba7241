// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Search Index Synchronization
//!
//! Publishes index-sync events consumed by the search service. These are
//! best-effort by design: a post that fails to reach the search index is
//! re-indexed later, so callers normally use the detached shape and never
//! fail their own operation on a sync error.

use crate::{
    errors::AmqpError,
    events::{DomainEvent, SEARCH_EXCHANGE, SEARCH_SYNC_ROUTING_KEY},
    publisher::Publisher,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Payload of a search-index synchronization event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSyncEvent {
    pub operation: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub entity_id: String,
    pub data: Value,
}

/// Publisher for search-index synchronization events.
pub struct SearchIndexPublisher {
    publisher: Arc<dyn Publisher>,
}

impl SearchIndexPublisher {
    pub fn new(publisher: Arc<dyn Publisher>) -> SearchIndexPublisher {
        SearchIndexPublisher { publisher }
    }

    /// Publishes a sync event and reports the outcome to the caller.
    pub async fn publish_sync_event(
        &self,
        operation: &str,
        entity_type: &str,
        entity_id: &str,
        data: Value,
    ) -> Result<(), AmqpError> {
        let event = sync_event(operation, entity_type, entity_id, data)?;

        self.publisher
            .publish(SEARCH_EXCHANGE, SEARCH_SYNC_ROUTING_KEY, &event)
            .await
    }

    /// Publishes a sync event best-effort; failures are only logged.
    pub fn publish_sync_event_detached(
        &self,
        operation: &str,
        entity_type: &str,
        entity_id: &str,
        data: Value,
    ) -> Result<(), AmqpError> {
        let event = sync_event(operation, entity_type, entity_id, data)?;

        self.publisher
            .publish_detached(SEARCH_EXCHANGE, SEARCH_SYNC_ROUTING_KEY, event);

        Ok(())
    }
}

fn sync_event(
    operation: &str,
    entity_type: &str,
    entity_id: &str,
    data: Value,
) -> Result<DomainEvent, AmqpError> {
    DomainEvent::new(
        SEARCH_SYNC_ROUTING_KEY,
        &SearchSyncEvent {
            operation: operation.to_owned(),
            entity_type: entity_type.to_owned(),
            entity_id: entity_id.to_owned(),
            data,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::MockPublisher;
    use serde_json::json;

    #[tokio::test]
    async fn sync_event_goes_to_search_exchange() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|exchange, key, event| {
                exchange == SEARCH_EXCHANGE
                    && key == SEARCH_SYNC_ROUTING_KEY
                    && event.event == "search.sync"
                    && event.data["operation"] == "upsert"
                    && event.data["type"] == "post"
                    && event.data["entity_id"] == "42"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let search = SearchIndexPublisher::new(Arc::new(publisher));
        let result = search
            .publish_sync_event("upsert", "post", "42", json!({"title": "hello"}))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn detached_shape_never_surfaces_publish_failure() {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish_detached()
            .times(1)
            .returning(|_, _, _| ());

        let search = SearchIndexPublisher::new(Arc::new(publisher));
        let result = search.publish_sync_event_detached("delete", "post", "42", json!({}));

        assert!(result.is_ok());
    }
}
