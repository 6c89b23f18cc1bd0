use std::sync::Arc;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS,
    SubscribeReasonCode,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use tankwatch_api::BoxFuture;

use crate::config::BrokerConfig;
use crate::error::SessionError;

/// Capacity of the request channel between `AsyncClient` and the event loop.
const REQUEST_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Broker callbacks, one method per event.
///
/// `on_message` is awaited inline by the event loop: messages are handled one
/// at a time, in delivery order.
pub trait SessionHandler: Send + Sync {
    fn on_connect(&self, _broker: &str) {}

    fn on_message<'a>(&'a self, topic: &'a str, payload: &'a [u8]) -> BoxFuture<'a, ()>;

    fn on_publish(&self, _pkid: u16) {}

    /// `granted` holds the granted QoS per filter, `None` for a refused filter.
    fn on_subscribe(&self, _pkid: u16, _granted: &[Option<u8>]) {}

    fn on_disconnect(&self, _error: &SessionError) {}
}

/// Owns the broker connection, the subscription and the event loop.
pub struct Session {
    core: SessionCore,
    eventloop: EventLoop,
}

/// Everything but the event loop, which is `!Sync` and stays in [`Session`].
struct SessionCore {
    client: AsyncClient,
    broker: String,
    topic_filter: String,
    reconnect_delay: std::time::Duration,
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    /// Build the session. Nothing touches the network until [`Session::run`].
    pub fn new(config: &BrokerConfig) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("tankwatch-{}", std::process::id()));

        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (state_tx, _) = watch::channel(SessionState::Disconnected);

        Self {
            core: SessionCore {
                client,
                broker: config.address(),
                topic_filter: config.topic_filter.clone(),
                reconnect_delay: config.reconnect_delay,
                state_tx,
            },
            eventloop,
        }
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.core.state_tx.subscribe()
    }

    /// Poll the broker until `shutdown` fires.
    ///
    /// Transport errors, including the very first connect, are reported to
    /// the handler and never end the loop: after `reconnect_delay` the next
    /// poll reconnects.
    pub async fn run(mut self, handler: Arc<dyn SessionHandler>, shutdown: CancellationToken) {
        let core = &self.core;
        tracing::info!(broker = %core.broker, filter = %core.topic_filter, "session starting");
        core.set_state(SessionState::Connecting);

        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                polled = self.eventloop.poll() => polled,
            };

            match polled {
                Ok(event) => core.on_event(event, handler.as_ref()).await,
                Err(e) => {
                    core.on_error(SessionError::classify(&core.broker, e), handler.as_ref());
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(core.reconnect_delay) => {}
                    }
                    core.set_state(SessionState::Connecting);
                }
            }
        }

        let connected = *core.state_tx.borrow() == SessionState::Connected;
        if connected && core.client.try_disconnect().is_ok() {
            // Give the loop a moment to flush DISCONNECT.
            let flush = self.eventloop.poll();
            let _ = tokio::time::timeout(std::time::Duration::from_millis(500), flush).await;
        }
        core.set_state(SessionState::Disconnected);
        tracing::info!(broker = %core.broker, "session stopped");
    }
}

impl SessionCore {
    fn set_state(&self, state: SessionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(broker = %self.broker, from = ?*current, to = ?state, "session state");
            *current = state;
            true
        });
    }

    async fn on_event(&self, event: Event, handler: &dyn SessionHandler) {
        let packet = match event {
            Event::Incoming(packet) => packet,
            Event::Outgoing(outgoing) => {
                tracing::trace!(?outgoing, "outgoing");
                return;
            }
        };

        match packet {
            Packet::ConnAck(ack) if ack.code == ConnectReturnCode::Success => {
                self.set_state(SessionState::Connected);
                handler.on_connect(&self.broker);
                // Clean session: the broker forgets subscriptions on every reconnect.
                let subscribed =
                    self.client.try_subscribe(self.topic_filter.clone(), QoS::AtMostOnce);
                if let Err(source) = subscribed {
                    let e = SessionError::Subscribe {
                        filter: self.topic_filter.clone(),
                        source,
                    };
                    tracing::error!(error = %e, "subscribe request failed");
                }
            }
            Packet::Publish(publish) => {
                handler.on_message(&publish.topic, &publish.payload).await;
            }
            Packet::PubAck(ack) => handler.on_publish(ack.pkid),
            Packet::SubAck(ack) => {
                let granted: Vec<Option<u8>> = ack
                    .return_codes
                    .iter()
                    .map(|code| match code {
                        SubscribeReasonCode::Success(qos) => Some(*qos as u8),
                        SubscribeReasonCode::Failure => None,
                    })
                    .collect();
                if granted.iter().any(Option::is_none) {
                    tracing::warn!(filter = %self.topic_filter, "broker refused the subscription");
                }
                handler.on_subscribe(ack.pkid, &granted);
            }
            other => tracing::trace!(packet = ?other, "incoming"),
        }
    }

    /// The only place broker errors are logged; handlers are told, not asked to log.
    fn on_error(&self, error: SessionError, handler: &dyn SessionHandler) {
        self.set_state(SessionState::Disconnected);
        tracing::warn!(error = %error, "broker connection error");
        handler.on_disconnect(&error);
    }
}
