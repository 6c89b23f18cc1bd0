//! Test doubles shared by the unit tests of this crate.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use tankwatch_api::{BoxFuture, PersistError, Reading, StoreConnection, StoreConnector};

use crate::clock::Clock;

pub(crate) fn sample_reading(tank: &str, sensor: &str, value: &str) -> Reading {
    Reading::new(epoch(), tank, sensor, value)
}

pub(crate) fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// Clock that only moves when told to.
pub(crate) struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Jump to `secs` seconds after the start.
    pub(crate) fn set(&self, secs: u64) {
        *self.offset.lock().unwrap() = Duration::from_secs(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    fn wall(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock().unwrap();
        epoch() + chrono::Duration::from_std(offset).unwrap()
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoreEvent {
    Connect,
    Begin,
    Insert(Reading),
    Commit,
    Close,
}

#[derive(Default)]
struct StoreState {
    events: Vec<StoreEvent>,
    committed: Vec<Reading>,
    open: usize,
    fail_connect: bool,
    fail_insert: bool,
    fail_commit: bool,
    stall_insert: bool,
    stall_close: bool,
}

/// In-memory store that records every connection step.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn fail_next_connect(&self) {
        self.lock().fail_connect = true;
    }

    pub(crate) fn fail_next_insert(&self) {
        self.lock().fail_insert = true;
    }

    pub(crate) fn fail_next_commit(&self) {
        self.lock().fail_commit = true;
    }

    pub(crate) fn stall_next_insert(&self) {
        self.lock().stall_insert = true;
    }

    /// The next close releases the connection, then never completes.
    pub(crate) fn stall_next_close(&self) {
        self.lock().stall_close = true;
    }

    pub(crate) fn events(&self) -> Vec<StoreEvent> {
        self.lock().events.clone()
    }

    pub(crate) fn count(&self, event: &StoreEvent) -> usize {
        self.lock().events.iter().filter(|e| *e == event).count()
    }

    pub(crate) fn committed(&self) -> Vec<Reading> {
        self.lock().committed.clone()
    }

    pub(crate) fn open_connections(&self) -> usize {
        self.lock().open
    }
}

impl StoreConnector for MemoryStore {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn StoreConnection>, PersistError>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.events.push(StoreEvent::Connect);
            if std::mem::take(&mut state.fail_connect) {
                return Err(PersistError::connect("connection refused"));
            }
            state.open += 1;
            drop(state);
            Ok(Box::new(MemoryConnection {
                store: self.clone(),
                pending: None,
            }) as Box<dyn StoreConnection>)
        })
    }
}

struct MemoryConnection {
    store: MemoryStore,
    pending: Option<Reading>,
}

impl StoreConnection for MemoryConnection {
    fn begin(&mut self) -> BoxFuture<'_, Result<(), PersistError>> {
        Box::pin(async move {
            self.store.lock().events.push(StoreEvent::Begin);
            Ok(())
        })
    }

    fn insert<'a>(&'a mut self, reading: &'a Reading) -> BoxFuture<'a, Result<(), PersistError>> {
        Box::pin(async move {
            let stall = {
                let mut state = self.store.lock();
                state.events.push(StoreEvent::Insert(reading.clone()));
                if std::mem::take(&mut state.fail_insert) {
                    return Err(PersistError::insert("relation \"aquariums\" does not exist"));
                }
                std::mem::take(&mut state.stall_insert)
            };
            if stall {
                std::future::pending::<()>().await;
            }
            self.pending = Some(reading.clone());
            Ok(())
        })
    }

    fn commit(&mut self) -> BoxFuture<'_, Result<(), PersistError>> {
        Box::pin(async move {
            let mut state = self.store.lock();
            state.events.push(StoreEvent::Commit);
            if std::mem::take(&mut state.fail_commit) {
                return Err(PersistError::commit("server closed the connection"));
            }
            if let Some(reading) = self.pending.take() {
                state.committed.push(reading);
            }
            Ok(())
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let stall = {
                let mut state = self.store.lock();
                state.events.push(StoreEvent::Close);
                state.open -= 1;
                std::mem::take(&mut state.stall_close)
            };
            if stall {
                std::future::pending::<()>().await;
            }
        })
    }
}
