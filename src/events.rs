// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Domain Event Vocabulary
//!
//! The wire format and naming conventions shared with every other consumer on
//! the broker. Exchange names and routing keys must be reproduced exactly;
//! routing keys follow the dot-separated `<entity>.<action>` convention and
//! each one gets a durable queue named after it.
//!
//! Events are immutable: built once by the calling service, serialized once,
//! never mutated afterwards.

use crate::errors::AmqpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// General domain-event exchange.
pub const DOMAIN_EXCHANGE: &str = "temuka_exchange";
/// Search-index synchronization exchange.
pub const SEARCH_EXCHANGE: &str = "temuka_search_exchange";
/// Recommendation-pipeline exchange.
pub const RECOMMENDATION_EXCHANGE: &str = "temuka_recommendation_exchange";
/// Analytics exchange.
pub const ANALYTICS_EXCHANGE: &str = "temuka_analytics_exchange";

pub const POST_CREATED_ROUTING_KEY: &str = "post.created";
pub const POST_UPDATED_ROUTING_KEY: &str = "post.updated";
pub const POST_DELETED_ROUTING_KEY: &str = "post.deleted";
pub const POST_LIKED_ROUTING_KEY: &str = "post.liked";
pub const POST_VIEWED_ROUTING_KEY: &str = "post.viewed";

pub const USER_CREATED_ROUTING_KEY: &str = "user.created";
pub const USER_UPDATED_ROUTING_KEY: &str = "user.updated";
pub const USER_FOLLOWED_ROUTING_KEY: &str = "user.followed";
pub const USER_UNFOLLOWED_ROUTING_KEY: &str = "user.unfollowed";

pub const COMMENT_CREATED_ROUTING_KEY: &str = "comment.created";
pub const COMMENT_DELETED_ROUTING_KEY: &str = "comment.deleted";

pub const COMMUNITY_VIEWED_ROUTING_KEY: &str = "community.viewed";
pub const COMMUNITY_JOINED_ROUTING_KEY: &str = "community.joined";
pub const COMMUNITY_LEFT_ROUTING_KEY: &str = "community.left";

pub const UNIVERSITY_VIEWED_ROUTING_KEY: &str = "university.viewed";
pub const UNIVERSITY_REVIEWED_ROUTING_KEY: &str = "university.reviewed";

pub const MAJOR_VIEWED_ROUTING_KEY: &str = "major.viewed";
pub const MAJOR_REVIEWED_ROUTING_KEY: &str = "major.reviewed";

pub const SEARCH_SYNC_ROUTING_KEY: &str = "search.sync";

/// The message body published for every domain event.
///
/// Serialized as `{"event": .., "timestamp": .., "data": ..}` with a unix
/// timestamp in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event: String,
    pub timestamp: i64,
    pub data: Value,
}

impl DomainEvent {
    /// Builds an event with the current unix timestamp.
    ///
    /// The payload is serialized here, exactly once; a payload that cannot be
    /// serialized fails the construction and never reaches a channel.
    pub fn new<T: Serialize>(event: &str, data: &T) -> Result<DomainEvent, AmqpError> {
        DomainEvent::at(event, unix_now(), data)
    }

    /// Builds an event with an explicit timestamp.
    pub fn at<T: Serialize>(event: &str, timestamp: i64, data: &T) -> Result<DomainEvent, AmqpError> {
        let data = serde_json::to_value(data).map_err(|_| AmqpError::ParsePayloadError)?;

        Ok(DomainEvent {
            event: event.to_owned(),
            timestamp,
            data,
        })
    }

    /// Encodes the event to its canonical JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(self).map_err(|_| AmqpError::ParsePayloadError)
    }
}

fn unix_now() -> i64 {
    // Pre-epoch clocks are not a supported deployment target.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde_json::json;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("nope"))
        }
    }

    #[test]
    fn event_envelope_shape() {
        let event = DomainEvent::at(
            POST_CREATED_ROUTING_KEY,
            1700000000,
            &json!({"post_id": 42, "user_id": 7}),
        )
        .unwrap();

        let encoded: Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();

        assert_eq!(encoded["event"], "post.created");
        assert_eq!(encoded["timestamp"], 1700000000);
        assert_eq!(encoded["data"]["post_id"], 42);
    }

    #[test]
    fn unserializable_payload_fails_construction() {
        let result = DomainEvent::new(POST_CREATED_ROUTING_KEY, &Unserializable);

        assert_eq!(result.unwrap_err(), AmqpError::ParsePayloadError);
    }

    #[test]
    fn new_stamps_current_time() {
        let event = DomainEvent::new(USER_FOLLOWED_ROUTING_KEY, &json!({})).unwrap();

        assert!(event.timestamp > 1700000000);
    }

    #[test]
    fn routing_keys_follow_entity_action_convention() {
        for key in [
            POST_CREATED_ROUTING_KEY,
            USER_UNFOLLOWED_ROUTING_KEY,
            COMMUNITY_JOINED_ROUTING_KEY,
            SEARCH_SYNC_ROUTING_KEY,
        ] {
            let parts: Vec<&str> = key.split('.').collect();
            assert_eq!(parts.len(), 2, "unexpected routing key shape: {key}");
        }
    }
}
