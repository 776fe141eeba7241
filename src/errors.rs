// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Messaging Core
//!
//! This module provides the error types for broker and realtime operations.
//! The `AmqpError` enum represents all possible error scenarios that can occur
//! during connection, channel, exchange, queue, and publishing operations, and
//! `HubError` covers failures when talking to the realtime hub event loop.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Connection and channel errors are fatal at startup only; once the
/// supervisors are running, loss of either is recovered in the background and
/// never surfaced through this type except as a failed publish attempted
/// during the recovery window.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error serializing an event payload
    #[error("failure to parse payload")]
    ParsePayloadError,
}

/// Represents errors that can occur when submitting commands to the realtime
/// hub.
///
/// The hub processes commands on a single event loop; the only failure mode
/// on the producer side is the loop having already terminated.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HubError {
    /// The hub event loop is no longer running
    #[error("realtime hub is closed")]
    Closed,
}
