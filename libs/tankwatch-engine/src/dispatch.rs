use std::sync::Arc;
use std::time::Duration;

use tankwatch_api::{BoxFuture, PersistError, Reading, ReadingWriter};

use crate::clock::Clock;
use crate::error::DispatchError;
use crate::rate_limit::{Admission, RateLimiter};
use crate::session::SessionHandler;
use crate::topic::SensorTopic;

/// What happened to one inbound message.
#[derive(Debug)]
pub enum DispatchOutcome {
    Stored(Reading),
    Throttled { retry_in: Duration },
    Dropped(DispatchError),
    Failed(PersistError),
}

/// Routes inbound messages: topic → fields, rate-limit gate, writer.
///
/// `handle` never fails. Every per-message error is logged here and
/// reported through the returned outcome, so the session loop keeps running.
pub struct Dispatcher {
    limiter: RateLimiter,
    writer: Arc<dyn ReadingWriter>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        limiter: RateLimiter,
        writer: Arc<dyn ReadingWriter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            writer,
            clock,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn handle(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        let fields = match SensorTopic::parse(topic) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(%topic, error = %e, "dropping message");
                return DispatchOutcome::Dropped(e);
            }
        };

        let value = match std::str::from_utf8(payload) {
            Ok(v) => v,
            Err(source) => {
                let e = DispatchError::PayloadDecode {
                    topic: topic.to_string(),
                    source,
                };
                tracing::warn!(%topic, error = %e, "dropping message");
                return DispatchOutcome::Dropped(e);
            }
        };

        if let Admission::Throttled { retry_in } = self.limiter.check(topic, self.clock.now()) {
            tracing::debug!(%topic, ?retry_in, "next update no sooner than");
            return DispatchOutcome::Throttled { retry_in };
        }

        let reading = Reading::new(self.clock.wall(), fields.tank, fields.sensor, value);
        match self.writer.write(&reading).await {
            Ok(()) => {
                tracing::info!(
                    time = %reading.time,
                    tank = %reading.tank,
                    sensor = %reading.sensor,
                    value = %reading.value,
                    "stored reading"
                );
                DispatchOutcome::Stored(reading)
            }
            Err(e) => {
                tracing::error!(%topic, error = %e, "persist error");
                DispatchOutcome::Failed(e)
            }
        }
    }
}

impl SessionHandler for Dispatcher {
    fn on_connect(&self, broker: &str) {
        tracing::info!(%broker, "connected to MQTT server");
    }

    fn on_message<'a>(&'a self, topic: &'a str, payload: &'a [u8]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.handle(topic, payload).await;
        })
    }

    fn on_publish(&self, pkid: u16) {
        tracing::debug!(mid = pkid, "publish acknowledged");
    }

    fn on_subscribe(&self, pkid: u16, granted: &[Option<u8>]) {
        tracing::info!(mid = pkid, ?granted, "subscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, MemoryStore, StoreEvent, epoch};
    use crate::writer::ScopedWriter;

    struct Harness {
        dispatcher: Dispatcher,
        clock: Arc<ManualClock>,
        store: MemoryStore,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new());
        let writer = ScopedWriter::new(
            Arc::new(store.clone()),
            Duration::from_secs(5),
            Duration::from_secs(10),
        );
        let dispatcher = Dispatcher::new(
            RateLimiter::new(Duration::from_secs(300)),
            Arc::new(writer),
            clock.clone(),
        );
        Harness {
            dispatcher,
            clock,
            store,
        }
    }

    #[tokio::test]
    async fn same_topic_is_throttled_for_five_minutes() {
        let h = harness();

        h.clock.set(0);
        let first = h.dispatcher.handle("aquariums/tank1/temp", b"24.5").await;
        assert!(matches!(first, DispatchOutcome::Stored(_)));

        h.clock.set(60);
        let second = h.dispatcher.handle("aquariums/tank1/temp", b"24.7").await;
        assert!(matches!(
            second,
            DispatchOutcome::Throttled { retry_in } if retry_in == Duration::from_secs(240)
        ));

        h.clock.set(301);
        let third = h.dispatcher.handle("aquariums/tank1/temp", b"24.9").await;
        assert!(matches!(third, DispatchOutcome::Stored(_)));

        let committed = h.store.committed();
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0], Reading::new(epoch(), "tank1", "temp", "24.5"));
        assert_eq!(committed[1].value, "24.9");
        assert_eq!(
            committed[1].time,
            epoch() + chrono::Duration::seconds(301)
        );
    }

    #[tokio::test]
    async fn different_tanks_are_stored_independently() {
        let h = harness();

        h.dispatcher.handle("aquariums/tank1/temp", b"24.5").await;
        h.dispatcher.handle("aquariums/tank2/temp", b"25.1").await;

        let tanks: Vec<String> = h.store.committed().into_iter().map(|r| r.tank).collect();
        assert_eq!(tanks, vec!["tank1", "tank2"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_dropped_and_later_messages_still_flow() {
        let h = harness();

        let outcome = h.dispatcher.handle("aquariums/tank1/temp", &[0xff, 0xfe, 0x80]).await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Dropped(DispatchError::PayloadDecode { .. })
        ));
        assert!(h.store.events().is_empty());

        // The bad payload did not consume the topic's slot.
        let next = h.dispatcher.handle("aquariums/tank1/temp", b"24.5").await;
        assert!(matches!(next, DispatchOutcome::Stored(_)));
        assert_eq!(h.store.committed().len(), 1);
    }

    #[tokio::test]
    async fn malformed_topic_is_dropped_without_touching_store_or_limiter() {
        let h = harness();

        let outcome = h.dispatcher.handle("aquariums/tank1", b"7.2").await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Dropped(DispatchError::MalformedTopic { .. })
        ));
        assert!(h.store.events().is_empty());
        assert_eq!(h.dispatcher.limiter().tracked_topics(), 0);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_stop_the_next_message() {
        let h = harness();
        h.store.fail_next_insert();

        let failed = h.dispatcher.handle("aquariums/tank1/temp", b"24.5").await;
        assert!(matches!(failed, DispatchOutcome::Failed(_)));

        // Other topic right away.
        let other = h.dispatcher.handle("aquariums/tank1/ph", b"7.1").await;
        assert!(matches!(other, DispatchOutcome::Stored(_)));

        // Same topic once the window has passed.
        h.clock.set(301);
        let same = h.dispatcher.handle("aquariums/tank1/temp", b"24.6").await;
        assert!(matches!(same, DispatchOutcome::Stored(_)));

        assert_eq!(h.store.committed().len(), 2);
        assert_eq!(h.store.count(&StoreEvent::Close), 3);
        assert_eq!(h.store.open_connections(), 0);
    }

    #[tokio::test]
    async fn failed_write_still_consumes_the_slot() {
        let h = harness();
        h.store.fail_next_commit();

        h.dispatcher.handle("aquariums/tank1/temp", b"24.5").await;
        h.clock.set(10);
        let retry = h.dispatcher.handle("aquariums/tank1/temp", b"24.5").await;
        assert!(matches!(retry, DispatchOutcome::Throttled { .. }));
    }

    #[tokio::test]
    async fn value_is_stored_as_opaque_text() {
        let h = harness();

        h.dispatcher.handle("aquariums/tank3/status", b"pump off").await;

        assert_eq!(h.store.committed()[0].value, "pump off");
    }

    #[tokio::test]
    async fn session_handler_routes_messages_to_handle() {
        let h = harness();
        let handler: &dyn SessionHandler = &h.dispatcher;

        handler.on_message("aquariums/tank1/temp", b"24.5").await;

        assert_eq!(h.store.committed().len(), 1);
    }
}
