use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::record::OutcomeRecord;

/// Append-only record storage shared between the collector task and readers.
#[derive(Debug, Clone, Default)]
pub struct RecordLog {
    inner: Arc<Mutex<Vec<OutcomeRecord>>>,
}

impl RecordLog {
    fn with<R>(&self, f: impl FnOnce(&mut Vec<OutcomeRecord>) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    fn push(&self, record: OutcomeRecord) {
        self.with(|log| log.push(record));
    }

    pub fn len(&self) -> usize {
        self.with(|log| log.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything collected so far.
    pub fn snapshot(&self) -> Vec<OutcomeRecord> {
        self.with(|log| log.clone())
    }

    /// Records appended at or after `start`.
    pub fn since(&self, start: usize) -> Vec<OutcomeRecord> {
        self.with(|log| log.get(start..).map(<[_]>::to_vec).unwrap_or_default())
    }

    fn take(&self) -> Vec<OutcomeRecord> {
        self.with(std::mem::take)
    }
}

/// Per-worker handle for submitting outcomes.
///
/// Records sent through one sink arrive in the order they were sent.
#[derive(Debug, Clone)]
pub struct RecordSink {
    tx: mpsc::UnboundedSender<OutcomeRecord>,
}

impl RecordSink {
    /// Returns `false` once the recorder has been sealed.
    pub fn record(&self, record: OutcomeRecord) -> bool {
        self.tx.send(record).is_ok()
    }
}

/// Collects outcome records from any number of workers through a channel.
///
/// A single collector task owns the receiving side and appends into a [`RecordLog`], so
/// workers never contend on a lock while they hold a response.
#[derive(Debug)]
pub struct Recorder {
    tx: mpsc::UnboundedSender<OutcomeRecord>,
    log: RecordLog,
    seal: CancellationToken,
    collector: JoinHandle<()>,
}

impl Recorder {
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutcomeRecord>();
        let log = RecordLog::default();
        let seal = CancellationToken::new();

        let collector_log = log.clone();
        let collector_seal = seal.clone();
        let collector = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    maybe = rx.recv() => match maybe {
                        Some(record) => collector_log.push(record),
                        None => return,
                    },
                    _ = collector_seal.cancelled() => break,
                }
            }

            // Reject late writers, then keep whatever was already queued.
            rx.close();
            while let Ok(record) = rx.try_recv() {
                collector_log.push(record);
            }
        });

        Self {
            tx,
            log,
            seal,
            collector,
        }
    }

    pub fn sink(&self) -> RecordSink {
        RecordSink {
            tx: self.tx.clone(),
        }
    }

    /// Shared read handle usable while the run is in progress.
    pub fn log(&self) -> RecordLog {
        self.log.clone()
    }

    pub fn snapshot(&self) -> Vec<OutcomeRecord> {
        self.log.snapshot()
    }

    /// Seal the recorder and return the frozen collection.
    ///
    /// Sinks still held elsewhere fail from this point on.
    pub async fn finish(self) -> Vec<OutcomeRecord> {
        let Self {
            tx,
            log,
            seal,
            collector,
        } = self;
        drop(tx);
        seal.cancel();
        if let Err(err) = collector.await {
            tracing::warn!(error = %err, "record collector ended abnormally");
        }
        log.take()
    }
}
