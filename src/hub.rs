// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Realtime Fan-out Hub
//!
//! Maintains the set of connected realtime clients and broadcasts messages to
//! all of them. Registration, unregistration and broadcasting are serialized
//! through a single event loop that is the only owner of the client set, fed
//! by a command channel from any number of producers (upgrade handlers
//! registering clients, per-connection readers feeding broadcasts). No locks,
//! no races.
//!
//! Each client's outbound queue is bounded and written with `try_send`, so a
//! slow or dead client can never stall a broadcast pass; clients that fail a
//! send are collected during the pass and removed after it. Removing a client
//! drops its sender, which ends that client's writer loop and closes the
//! underlying connection exactly once. Per-connection read/write loops are
//! owned by the transport layer that accepted the connection, not by the hub.

use crate::errors::HubError;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Buffer size of the hub command channel.
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Default buffer size of a client's outbound queue. A client that falls this
/// many messages behind is treated as dead.
pub const DEFAULT_CLIENT_BUFFER: usize = 32;

/// A connected realtime client as the hub sees it: an identity and the
/// sending side of its outbound queue.
pub struct RealtimeClient {
    id: uuid::Uuid,
    sender: mpsc::Sender<Value>,
}

impl RealtimeClient {
    /// Creates a client and the receiving side of its outbound queue.
    ///
    /// The transport layer drains the receiver into the connection; when the
    /// hub drops the sender the receiver closes and the writer loop ends.
    pub fn new(buffer: usize) -> (RealtimeClient, mpsc::Receiver<Value>) {
        let (sender, receiver) = mpsc::channel(buffer);

        (
            RealtimeClient {
                id: uuid::Uuid::new_v4(),
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    #[cfg(test)]
    pub(crate) fn from_parts(id: uuid::Uuid, sender: mpsc::Sender<Value>) -> RealtimeClient {
        RealtimeClient { id, sender }
    }
}

enum HubCommand {
    Register(RealtimeClient),
    Unregister(uuid::Uuid),
    Broadcast(Value),
    Count(oneshot::Sender<usize>),
}

/// The hub event loop state. Constructed with [`Hub::new`], consumed by
/// [`Hub::run`] on its own task.
pub struct Hub {
    commands: mpsc::Receiver<HubCommand>,
    clients: HashMap<uuid::Uuid, mpsc::Sender<Value>>,
}

/// Producer-side handle to the hub. Cheap to clone; the hub loop exits once
/// every handle is dropped.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Creates a hub and its handle with the default command buffer.
    pub fn new() -> (Hub, HubHandle) {
        Hub::with_buffer(DEFAULT_COMMAND_BUFFER)
    }

    /// Creates a hub with an explicit command buffer size.
    pub fn with_buffer(buffer: usize) -> (Hub, HubHandle) {
        let (sender, receiver) = mpsc::channel(buffer);

        (
            Hub {
                commands: receiver,
                clients: HashMap::new(),
            },
            HubHandle { commands: sender },
        )
    }

    /// Runs the event loop until every [`HubHandle`] has been dropped.
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                HubCommand::Register(client) => {
                    debug!(client = client.id.to_string(), "realtime client registered");
                    self.clients.insert(client.id, client.sender);
                }
                HubCommand::Unregister(id) => {
                    // No-op when the client is already gone.
                    if self.clients.remove(&id).is_some() {
                        debug!(client = id.to_string(), "realtime client unregistered");
                    }
                }
                HubCommand::Broadcast(message) => self.broadcast(message),
                HubCommand::Count(reply) => {
                    let _ = reply.send(self.clients.len());
                }
            }
        }

        debug!("realtime hub stopped");
    }

    /// One broadcast pass. Failed clients are collected and removed after the
    /// pass so that one dead client never affects delivery to the rest.
    fn broadcast(&mut self, message: Value) {
        let mut dead = Vec::new();

        for (id, sender) in &self.clients {
            if sender.try_send(message.clone()).is_err() {
                dead.push(*id);
            }
        }

        for id in dead {
            self.clients.remove(&id);
            warn!(client = id.to_string(), "dropping unresponsive realtime client");
        }
    }
}

impl HubHandle {
    /// Adds the client to the set and returns its id.
    pub async fn register(&self, client: RealtimeClient) -> Result<uuid::Uuid, HubError> {
        let id = client.id;

        self.commands
            .send(HubCommand::Register(client))
            .await
            .map_err(|_| HubError::Closed)?;

        Ok(id)
    }

    /// Removes the client from the set. Unregistering an unknown id is a
    /// no-op.
    pub async fn unregister(&self, id: uuid::Uuid) -> Result<(), HubError> {
        self.commands
            .send(HubCommand::Unregister(id))
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Delivers the message to every currently registered client.
    pub async fn broadcast(&self, message: Value) -> Result<(), HubError> {
        self.commands
            .send(HubCommand::Broadcast(message))
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Number of currently registered clients.
    pub async fn client_count(&self) -> Result<usize, HubError> {
        let (reply, response) = oneshot::channel();

        self.commands
            .send(HubCommand::Count(reply))
            .await
            .map_err(|_| HubError::Closed)?;

        response.await.map_err(|_| HubError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start_hub() -> HubHandle {
        let (hub, handle) = Hub::new();
        tokio::spawn(hub.run());
        handle
    }

    #[tokio::test]
    async fn broadcast_reaches_every_client() {
        let handle = start_hub();

        let (client_a, mut rx_a) = RealtimeClient::new(DEFAULT_CLIENT_BUFFER);
        let (client_b, mut rx_b) = RealtimeClient::new(DEFAULT_CLIENT_BUFFER);
        handle.register(client_a).await.unwrap();
        handle.register(client_b).await.unwrap();

        handle.broadcast(json!({"event": "post.created"})).await.unwrap();

        // Count acts as a barrier: the loop has processed the broadcast once
        // it answers.
        assert_eq!(handle.client_count().await.unwrap(), 2);
        assert_eq!(rx_a.try_recv().unwrap()["event"], "post.created");
        assert_eq!(rx_b.try_recv().unwrap()["event"], "post.created");
    }

    #[tokio::test]
    async fn dead_client_is_removed_without_disturbing_others() {
        let handle = start_hub();

        let (client_a, mut rx_a) = RealtimeClient::new(DEFAULT_CLIENT_BUFFER);
        let (client_b, rx_b) = RealtimeClient::new(DEFAULT_CLIENT_BUFFER);
        handle.register(client_a).await.unwrap();
        handle.register(client_b).await.unwrap();

        // Simulate a failed connection: its outbound queue is gone.
        drop(rx_b);

        handle.broadcast(json!({"seq": 1})).await.unwrap();
        assert_eq!(handle.client_count().await.unwrap(), 1);
        assert_eq!(rx_a.try_recv().unwrap()["seq"], 1);

        handle.broadcast(json!({"seq": 2})).await.unwrap();
        assert_eq!(handle.client_count().await.unwrap(), 1);
        assert_eq!(rx_a.try_recv().unwrap()["seq"], 2);
    }

    #[tokio::test]
    async fn slow_client_is_dropped_instead_of_stalling_the_pass() {
        let handle = start_hub();

        let (slow, _rx_slow) = RealtimeClient::new(1);
        let (fast, mut rx_fast) = RealtimeClient::new(DEFAULT_CLIENT_BUFFER);
        handle.register(slow).await.unwrap();
        handle.register(fast).await.unwrap();

        // First broadcast fills the slow client's queue; the second fails its
        // try_send and evicts it.
        handle.broadcast(json!({"seq": 1})).await.unwrap();
        handle.broadcast(json!({"seq": 2})).await.unwrap();

        assert_eq!(handle.client_count().await.unwrap(), 1);
        assert_eq!(rx_fast.try_recv().unwrap()["seq"], 1);
        assert_eq!(rx_fast.try_recv().unwrap()["seq"], 2);
    }

    #[tokio::test]
    async fn duplicate_register_keeps_one_entry() {
        let handle = start_hub();

        let (client, _rx_old) = RealtimeClient::new(DEFAULT_CLIENT_BUFFER);
        let id = client.id();
        handle.register(client).await.unwrap();

        // The same connection re-registers, e.g. after an upgrade retry.
        let (sender, mut rx_new) = mpsc::channel(DEFAULT_CLIENT_BUFFER);
        handle
            .register(RealtimeClient::from_parts(id, sender))
            .await
            .unwrap();

        handle.broadcast(json!({"event": "user.followed"})).await.unwrap();

        assert_eq!(handle.client_count().await.unwrap(), 1);
        assert_eq!(rx_new.try_recv().unwrap()["event"], "user.followed");
        assert!(rx_new.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_unknown_client_is_a_noop() {
        let handle = start_hub();

        let (client, _rx) = RealtimeClient::new(DEFAULT_CLIENT_BUFFER);
        handle.register(client).await.unwrap();

        handle.unregister(uuid::Uuid::new_v4()).await.unwrap();

        assert_eq!(handle.client_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unregister_closes_the_client_queue() {
        let handle = start_hub();

        let (client, mut rx) = RealtimeClient::new(DEFAULT_CLIENT_BUFFER);
        let id = handle.register(client).await.unwrap();

        handle.unregister(id).await.unwrap();
        assert_eq!(handle.client_count().await.unwrap(), 0);

        // Sender dropped by the hub; the transport's writer loop sees the
        // queue close.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn hub_stops_when_handles_are_dropped() {
        let (hub, handle) = Hub::new();
        let loop_task = tokio::spawn(hub.run());

        drop(handle);

        loop_task.await.unwrap();
    }
}
