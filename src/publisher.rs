// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Event Publisher
//!
//! Publishes domain events to an exchange under a routing key. A successful
//! publish means "handed to the channel", nothing more: no confirms are
//! awaited and transient failures are not retried here. The caller decides
//! whether a failed publish fails its own operation.
//!
//! Two call shapes are exposed: [`Publisher::publish`] for flows where the
//! caller's operation depends on the event going out, and
//! [`Publisher::publish_detached`] for best-effort events whose failure is
//! only ever logged.

use crate::{
    channel::BrokerChannel,
    errors::AmqpError,
    events::DomainEvent,
    exchange::ExchangeDefinition,
    otel::RabbitMQTracePropagator,
    queue::{QueueBinding, QueueDefinition},
    topology::{AmqpTopology, Topology},
};
use async_trait::async_trait;
use lapin::{
    options::BasicPublishOptions,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties,
};
use opentelemetry::{global, Context};
use std::{collections::BTreeMap, sync::Arc};
use tracing::error;
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Deliveries are marked persistent so they survive a broker restart.
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Publishing interface handed to application services.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes the event synchronously; serialization failures and channel
    /// rejections are returned to the caller.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        event: &DomainEvent,
    ) -> Result<(), AmqpError>;

    /// Publishes the event on a detached task; failures are logged and never
    /// surfaced.
    fn publish_detached(&self, exchange: &str, routing_key: &str, event: DomainEvent);
}

/// RabbitMQ implementation of the Publisher trait.
///
/// Holds its own supervised channel; publishers never share channels, so one
/// publisher's declare or publish traffic cannot interfere with another's.
pub struct RabbitMQPublisher {
    channel: Arc<BrokerChannel>,
}

impl RabbitMQPublisher {
    /// Creates a new RabbitMQ publisher over the given channel.
    pub fn new(channel: Arc<BrokerChannel>) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher { channel })
    }

    /// Creates a publisher and installs its topology first: a durable direct
    /// exchange and, per routing key, a durable queue named after the key and
    /// bound under it.
    pub async fn with_topology(
        channel: Arc<BrokerChannel>,
        exchange: &str,
        routing_keys: &[&str],
    ) -> Result<Arc<RabbitMQPublisher>, AmqpError> {
        let exchange_def = ExchangeDefinition::new(exchange).durable();
        let queue_defs: Vec<QueueDefinition> = routing_keys
            .iter()
            .map(|key| QueueDefinition::new(key).durable())
            .collect();
        let bindings: Vec<QueueBinding> = routing_keys
            .iter()
            .map(|key| QueueBinding::for_routing_key(key, exchange))
            .collect();

        let mut topology = AmqpTopology::new(Arc::clone(&channel)).exchange(&exchange_def);
        for def in &queue_defs {
            topology = topology.queue(def);
        }
        for binding in &bindings {
            topology = topology.queue_binding(binding);
        }
        topology.install().await?;

        Ok(RabbitMQPublisher::new(channel))
    }

    async fn publish_bytes(
        channel: Arc<BrokerChannel>,
        exchange: &str,
        routing_key: &str,
        event_name: &str,
        body: Vec<u8>,
    ) -> Result<(), AmqpError> {
        match channel
            .current()
            .await
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &body,
                message_properties(event_name),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Publisher for RabbitMQPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        event: &DomainEvent,
    ) -> Result<(), AmqpError> {
        let body = event.to_bytes()?;

        RabbitMQPublisher::publish_bytes(
            Arc::clone(&self.channel),
            exchange,
            routing_key,
            &event.event,
            body,
        )
        .await
    }

    fn publish_detached(&self, exchange: &str, routing_key: &str, event: DomainEvent) {
        let channel = Arc::clone(&self.channel);
        let exchange = exchange.to_owned();
        let routing_key = routing_key.to_owned();

        tokio::spawn(async move {
            let body = match event.to_bytes() {
                Ok(body) => body,
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        event = event.event,
                        "error encoding detached event"
                    );
                    return;
                }
            };

            if let Err(err) = RabbitMQPublisher::publish_bytes(
                channel,
                &exchange,
                &routing_key,
                &event.event,
                body,
            )
            .await
            {
                error!(
                    error = err.to_string(),
                    event = event.event,
                    "error publishing detached event"
                );
            }
        });
    }
}

/// Builds the delivery properties for an outgoing event: JSON content type,
/// persistent delivery, a fresh message id and the current trace context in
/// the headers.
fn message_properties(event_name: &str) -> BasicProperties {
    let mut headers = BTreeMap::<ShortString, AMQPValue>::default();

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(
            &Context::current(),
            &mut RabbitMQTracePropagator::new(&mut headers),
        )
    });

    BasicProperties::default()
        .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
        .with_kind(ShortString::from(event_name.to_owned()))
        .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(FieldTable::from(headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_mark_delivery_persistent_json() {
        let props = message_properties("post.created");

        assert_eq!(
            props.content_type().as_ref().map(|c| c.as_str()),
            Some(JSON_CONTENT_TYPE)
        );
        assert_eq!(*props.delivery_mode(), Some(PERSISTENT_DELIVERY_MODE));
        assert_eq!(
            props.kind().as_ref().map(|k| k.as_str()),
            Some("post.created")
        );
        assert!(props.message_id().is_some());
    }

    #[test]
    fn message_ids_are_unique_per_delivery() {
        let first = message_properties("post.created");
        let second = message_properties("post.created");

        assert_ne!(first.message_id(), second.message_id());
    }
}
