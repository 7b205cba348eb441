//! TurnRecord store (spec §6.4) — best-effort, never-blocking persistence.
//!
//! `record()` only enqueues; a background task owns the actual write and
//! retries failures with backoff. The voice pipeline never awaits I/O
//! here (spec §7 "never-block rule").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::turn_record::TurnRecord;

/// Where a [`TurnRecord`] is ultimately written. Implementations may hit
/// a database, a file, or (in tests) an in-memory `Vec`.
pub trait TurnSink: Send + Sync {
    /// Attempt one write. `Err` triggers a retry by the queue worker.
    fn write(&self, record: &TurnRecord) -> Result<(), String>;
}

/// In-memory sink used by tests and local/dev deployments.
#[derive(Default)]
pub struct InMemorySink {
    records: RwLock<Vec<TurnRecord>>,
    /// When `Some(n)`, the first `n` writes for a given turn_id fail before
    /// succeeding — used to exercise the retry path in tests.
    fail_first_n: Option<usize>,
    attempts: RwLock<std::collections::HashMap<String, usize>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flaky(fail_first_n: usize) -> Self {
        Self {
            fail_first_n: Some(fail_first_n),
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<TurnRecord> {
        self.records.read().clone()
    }
}

impl TurnSink for InMemorySink {
    fn write(&self, record: &TurnRecord) -> Result<(), String> {
        if let Some(n) = self.fail_first_n {
            let mut attempts = self.attempts.write();
            let count = attempts.entry(record.turn_id.clone()).or_insert(0);
            if *count < n {
                *count += 1;
                return Err("simulated transient write failure".into());
            }
        }
        self.records.write().push(record.clone());
        Ok(())
    }
}

/// Enqueues [`TurnRecord`]s for background persistence with bounded retry.
pub struct TurnStore {
    tx: mpsc::UnboundedSender<TurnRecord>,
    dropped_writes: Arc<AtomicU64>,
}

impl TurnStore {
    /// Spawn the background writer task against `sink`. `max_attempts`
    /// bounds retries per record before it is dropped (and the dropped
    /// counter incremented, per spec §7).
    pub fn spawn(sink: Arc<dyn TurnSink>, max_attempts: u32, retry_delay: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<TurnRecord>();
        let dropped_writes = Arc::new(AtomicU64::new(0));
        let dropped_for_task = dropped_writes.clone();

        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let mut attempt = 0;
                loop {
                    match sink.write(&record) {
                        Ok(()) => break,
                        Err(e) => {
                            attempt += 1;
                            if attempt >= max_attempts {
                                tracing::warn!(
                                    turn_id = %record.turn_id,
                                    error = %e,
                                    attempts = attempt,
                                    "dropping turn record after exhausting retries"
                                );
                                dropped_for_task.fetch_add(1, Ordering::Relaxed);
                                break;
                            }
                            tokio::time::sleep(retry_delay).await;
                        }
                    }
                }
            }
        });

        Self { tx, dropped_writes }
    }

    /// Enqueue a record. Never blocks; silently drops only if the
    /// background task itself has already shut down.
    pub fn record(&self, record: TurnRecord) {
        if self.tx.send(record).is_err() {
            self.dropped_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_writes(&self) -> u64 {
        self.dropped_writes.load(Ordering::Relaxed)
    }
}
