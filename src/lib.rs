// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Messaging and realtime core for the Temuka platform: supervised broker
//! connection and channels, topology registration, the domain-event
//! publisher, and the realtime fan-out hub.

mod otel;

pub mod channel;
pub mod config;
pub mod connection;
pub mod errors;
pub mod events;
pub mod exchange;
pub mod hub;
pub mod publisher;
pub mod queue;
pub mod search;
pub mod topology;
