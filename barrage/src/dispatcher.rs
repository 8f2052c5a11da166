use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::measurement::Measurement;

/// Sink for measurements produced by request steps of every virtual user.
///
/// The dispatcher is created at run start and shared by reference (`Arc`) with every
/// materializer that needs it. `dispatch` is a non-blocking channel send, so any number of
/// users may append concurrently without losing events. The reporting side drains the
/// paired [`EventStream`].
///
/// Measurements of steps configured with cumulative measurement are folded into one bucket
/// per (scenario, step) pair and emitted once, when the dispatcher is
/// [closed](EventDispatcher::close).
#[derive(Debug)]
pub struct EventDispatcher {
    tx: RwLock<Option<UnboundedSender<Measurement>>>,
    cumulative: Mutex<HashMap<(String, String), Measurement>>,
}

/// Receiving half of an [`EventDispatcher`]. Ends once the dispatcher is closed and drained.
#[derive(Debug)]
pub struct EventStream {
    rx: UnboundedReceiver<Measurement>,
}

impl EventDispatcher {
    pub fn new() -> (Arc<Self>, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            tx: RwLock::new(Some(tx)),
            cumulative: Mutex::new(HashMap::new()),
        };
        (Arc::new(dispatcher), EventStream { rx })
    }

    /// Fire-and-forget. Measurements dispatched after `close` are dropped.
    pub fn dispatch(&self, measurement: Measurement) {
        let guard = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(measurement).is_err() {
                    tracing::debug!("Event stream dropped, discarding measurement.");
                }
            }
            None => {
                tracing::warn!(
                    "Dispatcher already closed, discarding measurement of {}",
                    measurement.scenario
                );
            }
        }
    }

    /// Folds `measurement` into the cumulative bucket of `step` within its scenario.
    pub fn accumulate(&self, step: &str, measurement: Measurement) {
        let key = (measurement.scenario.clone(), step.to_string());
        let mut buckets = self
            .cumulative
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match buckets.entry(key) {
            Entry::Occupied(mut bucket) => bucket.get_mut().merge(measurement),
            Entry::Vacant(slot) => {
                slot.insert(measurement);
            }
        }
    }

    /// Emits the cumulative buckets and closes the stream. Idempotent.
    pub fn close(&self) {
        let buckets: Vec<Measurement> = self
            .cumulative
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, m)| m)
            .collect();
        tracing::debug!("Flushing {} cumulative measurement(s).", buckets.len());
        for bucket in buckets {
            self.dispatch(bucket);
        }
        self.tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<Measurement> {
        self.rx.recv().await
    }

    /// Returns the next buffered measurement without waiting.
    pub fn try_recv(&mut self) -> Option<Measurement> {
        match self.rx.try_recv() {
            Ok(m) => Some(m),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drains the stream until the dispatcher is closed.
    pub async fn collect_all(mut self) -> Vec<Measurement> {
        let mut out = Vec::new();
        while let Some(m) = self.recv().await {
            out.push(m);
        }
        out
    }
}
