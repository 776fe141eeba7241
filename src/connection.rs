// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection Supervision
//!
//! This module owns the single broker connection used by the process. The
//! initial dial is fatal on failure; after that a background task watches for
//! unexpected closure and redials on a fixed interval, forever, swapping the
//! handle in place. Callers never see recovery, they only ever read the
//! current handle.

use crate::{config::BrokerConfig, errors::AmqpError};
use lapin::{protocol::constants::REPLY_SUCCESS, types::LongString, Connection, ConnectionProperties};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    sync::{mpsc, RwLock},
    time,
};
use tracing::{debug, error, warn};

/// Delay between redial attempts after the connection is lost.
pub const RECONNECT_DELAY: time::Duration = time::Duration::from_secs(5);

/// Supervisor owning the broker connection.
///
/// The handle is swapped under the `RwLock` on every reconnect; readers must
/// go through [`BrokerConnection::current`] and must not hold the returned
/// `Arc` across long spans if they care about freshness: a handle obtained
/// before a reconnect keeps pointing at the dead connection.
pub struct BrokerConnection {
    uri: String,
    properties: ConnectionProperties,
    inner: RwLock<Arc<Connection>>,
    shutting_down: AtomicBool,
}

impl BrokerConnection {
    /// Dials the broker and starts the supervision task.
    ///
    /// Failure here is fatal: the process is expected to abort startup when it
    /// cannot reach the broker it depends on. Later connection loss is
    /// recovered in the background and never reported through this API.
    pub async fn connect(cfg: &BrokerConfig) -> Result<Arc<BrokerConnection>, AmqpError> {
        let properties = ConnectionProperties::default()
            .with_connection_name(LongString::from(cfg.app_name.clone()));
        let uri = cfg.uri();

        debug!("creating amqp connection...");
        let conn = match Connection::connect(&uri, properties.clone()).await {
            Ok(c) => c,
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                return Err(AmqpError::ConnectionError);
            }
        };
        debug!("amqp connected");

        let (notify, closed) = mpsc::unbounded_channel();
        watch(&conn, notify.clone());

        let supervisor = Arc::new(BrokerConnection {
            uri,
            properties,
            inner: RwLock::new(Arc::new(conn)),
            shutting_down: AtomicBool::new(false),
        });

        tokio::spawn(Arc::clone(&supervisor).supervise(closed, notify));

        Ok(supervisor)
    }

    /// Returns the current connection handle.
    pub async fn current(&self) -> Arc<Connection> {
        self.inner.read().await.clone()
    }

    /// Closes the connection gracefully and stops the supervision task.
    ///
    /// Channels derived from this connection become unusable; their
    /// supervisors stop retrying once they observe the shutdown.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let conn = self.current().await;
        if let Err(err) = conn.close(REPLY_SUCCESS, "shutting down").await {
            warn!(error = err.to_string(), "error closing amqp connection");
        }
    }

    /// Whether [`BrokerConnection::shutdown`] has been requested.
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    async fn supervise(
        self: Arc<BrokerConnection>,
        mut closed: mpsc::UnboundedReceiver<lapin::Error>,
        notify: mpsc::UnboundedSender<lapin::Error>,
    ) {
        while let Some(err) = closed.recv().await {
            if self.is_shutting_down() {
                debug!("amqp connection closed for shutdown");
                return;
            }

            warn!(error = err.to_string(), "amqp connection lost");

            loop {
                time::sleep(RECONNECT_DELAY).await;

                if self.is_shutting_down() {
                    return;
                }

                debug!("reconnecting to amqp broker...");
                match Connection::connect(&self.uri, self.properties.clone()).await {
                    Ok(conn) => {
                        watch(&conn, notify.clone());
                        *self.inner.write().await = Arc::new(conn);
                        debug!("amqp connection re-established");
                        break;
                    }
                    Err(err) => {
                        warn!(error = err.to_string(), "amqp reconnect failed");
                    }
                }
            }
        }
    }
}

/// Registers the closure notification for a freshly dialed connection.
fn watch(conn: &Connection, notify: mpsc::UnboundedSender<lapin::Error>) {
    conn.on_error(move |err| {
        let _ = notify.send(err);
    });
}
