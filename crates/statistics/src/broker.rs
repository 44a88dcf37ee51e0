//! Broker seam for the statistics exporter.
//!
//! The exporter opens one channel per cycle, publishes each record on it and
//! closes it when the cycle ends. `NatsBroker` is the production
//! implementation; `CaptureBroker` keeps everything in memory for tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rotator_core::types::OutcomeRecord;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("can't open channel: {0}")]
    Open(String),

    #[error("can't publish: {0}")]
    Publish(String),

    #[error("can't close channel: {0}")]
    Close(String),
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn open_channel(&self) -> Result<Box<dyn PublishChannel>, BrokerError>;
}

#[async_trait]
pub trait PublishChannel: Send {
    async fn publish(&mut self, payload: Bytes) -> Result<(), BrokerError>;

    async fn close(&mut self) -> Result<(), BrokerError>;
}

#[derive(Default)]
struct CaptureState {
    published: Mutex<Vec<Bytes>>,
    failing_attempts: Mutex<HashSet<usize>>,
    publish_delay: Mutex<Option<Duration>>,
    publish_attempts: AtomicUsize,
    fail_open: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// In-memory broker that records every published payload.
#[derive(Clone, Default)]
pub struct CaptureBroker {
    state: Arc<CaptureState>,
}

impl CaptureBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make the `attempt`-th publish (0-based, counted across all channels) fail.
    pub fn fail_publish_attempt(&self, attempt: usize) {
        self.state.failing_attempts.lock().insert(attempt);
    }

    /// Sleep before accepting each publish.
    pub fn set_publish_delay(&self, delay: Duration) {
        *self.state.publish_delay.lock() = Some(delay);
    }

    pub fn published(&self) -> Vec<Bytes> {
        self.state.published.lock().clone()
    }

    /// Published payloads decoded back into records; undecodable ones are skipped.
    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.state
            .published
            .lock()
            .iter()
            .filter_map(|p| serde_json::from_slice(p).ok())
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for CaptureBroker {
    async fn open_channel(&self) -> Result<Box<dyn PublishChannel>, BrokerError> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(BrokerError::Open("capture broker is unavailable".to_string()));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CaptureChannel {
            state: self.state.clone(),
        }))
    }
}

struct CaptureChannel {
    state: Arc<CaptureState>,
}

#[async_trait]
impl PublishChannel for CaptureChannel {
    async fn publish(&mut self, payload: Bytes) -> Result<(), BrokerError> {
        let delay = *self.state.publish_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let attempt = self.state.publish_attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.failing_attempts.lock().contains(&attempt) {
            return Err(BrokerError::Publish(format!("attempt {attempt} rejected")));
        }
        self.state.published.lock().push(payload);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
