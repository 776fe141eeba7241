// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Supervision
//!
//! Mirrors the connection supervisor one layer down: a channel can be closed
//! by the broker on a protocol error while the connection stays healthy, so
//! each channel watches for its own closure and recreates itself from the
//! connection supervisor's current handle on a fixed, shorter interval.
//!
//! Each publisher holds its own `BrokerChannel`; channels are never shared
//! across publishers, so declare/bind traffic on one cannot interfere with
//! another. Channel recreation never triggers connection recovery; if the
//! connection is itself mid-reconnect, recreation simply fails and retries.

use crate::{connection::BrokerConnection, errors::AmqpError};
use lapin::Channel;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, RwLock},
    time,
};
use tracing::{debug, error, warn};

/// Delay between channel recreation attempts after the channel is closed.
pub const RECREATE_DELAY: time::Duration = time::Duration::from_secs(2);

/// Supervisor owning one logical channel over the broker connection.
pub struct BrokerChannel {
    connection: Arc<BrokerConnection>,
    inner: RwLock<Arc<Channel>>,
}

impl BrokerChannel {
    /// Opens a channel on the current connection and starts its supervision
    /// task.
    ///
    /// Failure here is fatal for the same reason an initial dial failure is:
    /// a publisher that cannot obtain its channel at startup must not start.
    pub async fn open(connection: Arc<BrokerConnection>) -> Result<Arc<BrokerChannel>, AmqpError> {
        debug!("creating amqp channel...");
        let channel = match connection.current().await.create_channel().await {
            Ok(c) => c,
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                return Err(AmqpError::ChannelError);
            }
        };
        debug!("channel created");

        let (notify, closed) = mpsc::unbounded_channel();
        watch(&channel, notify.clone());

        let supervisor = Arc::new(BrokerChannel {
            connection,
            inner: RwLock::new(Arc::new(channel)),
        });

        tokio::spawn(Arc::clone(&supervisor).supervise(closed, notify));

        Ok(supervisor)
    }

    /// Returns the current channel handle.
    ///
    /// Sequential publishes through handles obtained here keep their call
    /// order; concurrent use of one handle requires external serialization.
    pub async fn current(&self) -> Arc<Channel> {
        self.inner.read().await.clone()
    }

    async fn supervise(
        self: Arc<BrokerChannel>,
        mut closed: mpsc::UnboundedReceiver<lapin::Error>,
        notify: mpsc::UnboundedSender<lapin::Error>,
    ) {
        while let Some(err) = closed.recv().await {
            if self.connection.is_shutting_down() {
                debug!("amqp channel closed for shutdown");
                return;
            }

            warn!(error = err.to_string(), "amqp channel closed");

            loop {
                time::sleep(RECREATE_DELAY).await;

                if self.connection.is_shutting_down() {
                    return;
                }

                match self.connection.current().await.create_channel().await {
                    Ok(channel) => {
                        watch(&channel, notify.clone());
                        *self.inner.write().await = Arc::new(channel);
                        debug!("amqp channel recreated");
                        break;
                    }
                    Err(err) => {
                        warn!(error = err.to_string(), "failed to recreate channel");
                    }
                }
            }
        }
    }
}

/// Registers the closure notification for a freshly created channel.
fn watch(channel: &Channel, notify: mpsc::UnboundedSender<lapin::Error>) {
    channel.on_error(move |err| {
        let _ = notify.send(err);
    });
}
