//! Where the row store comes from.
//!
//! A `RecordSource` is fetched off the UI thread by a `Loader`. Every request
//! gets a new generation number and only the result of the newest request is
//! handed back, so a slow earlier fetch can never overwrite a newer one.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::domain::GridError;
use crate::record::Record;

pub trait RecordSource: Send + Sync {
    type Record: Record;

    /// Human readable name of the source, used for titles and logs.
    fn describe(&self) -> String;

    fn fetch(&self) -> Result<Vec<Self::Record>, GridError>;

    /// The records together with the field names. Sources that read a schema
    /// know the fields even when there are no rows.
    fn fetch_batch(&self) -> Result<RecordBatch<Self::Record>, GridError> {
        Ok(RecordBatch {
            fields: Vec::new(),
            records: self.fetch()?,
        })
    }
}

/// One fetched row store.
#[derive(Debug)]
pub struct RecordBatch<R> {
    /// Field names in display order, empty when the source has no schema.
    pub fields: Vec<String>,
    pub records: Vec<R>,
}

/// Hands out a fixed set of records.
#[derive(Debug, Clone)]
pub struct MemorySource<R> {
    name: String,
    fields: Vec<String>,
    records: Vec<R>,
}

impl<R> MemorySource<R> {
    pub fn new(name: impl Into<String>, records: Vec<R>) -> Self {
        MemorySource {
            name: name.into(),
            fields: Vec::new(),
            records,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl<R: Record + Clone> RecordSource for MemorySource<R> {
    type Record = R;

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn fetch(&self) -> Result<Vec<R>, GridError> {
        Ok(self.records.clone())
    }

    fn fetch_batch(&self) -> Result<RecordBatch<R>, GridError> {
        Ok(RecordBatch {
            fields: self.fields.clone(),
            records: self.records.clone(),
        })
    }
}

/// Result of one fetch request.
#[derive(Debug)]
pub struct Fetched<R> {
    pub generation: u64,
    pub result: Result<RecordBatch<R>, GridError>,
}

pub struct Loader<R: Record + 'static> {
    source: Arc<dyn RecordSource<Record = R>>,
    generation: u64,
    in_flight: bool,
    sender: Sender<Fetched<R>>,
    receiver: Receiver<Fetched<R>>,
}

impl<R: Record + 'static> Loader<R> {
    pub fn new<S>(source: S) -> Self
    where
        S: RecordSource<Record = R> + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        Loader {
            source: Arc::new(source),
            generation: 0,
            in_flight: false,
            sender,
            receiver,
        }
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Start a fetch on a worker thread. Any older request still running
    /// becomes stale.
    pub fn request(&mut self) -> Result<u64, GridError> {
        self.request_with(|name, job| thread::Builder::new().name(name).spawn(job).map(|_| ()))
    }

    fn request_with<F>(&mut self, spawn: F) -> Result<u64, GridError>
    where
        F: FnOnce(String, Box<dyn FnOnce() + Send + 'static>) -> io::Result<()>,
    {
        let generation = self.generation + 1;
        let source = Arc::clone(&self.source);
        let sender = self.sender.clone();

        info!("Fetching {} (generation {generation})", source.describe());
        spawn(
            format!("fetch-{generation}"),
            Box::new(move || {
                let start_time = Instant::now();
                let result = source.fetch_batch();
                debug!(
                    "Fetch generation {generation} finished in {}ms",
                    start_time.elapsed().as_millis()
                );
                // The loader may already be gone, nothing to deliver to then.
                let _ = sender.send(Fetched { generation, result });
            }),
        )?;
        // Only a running fetch may make older requests stale.
        self.generation = generation;
        self.in_flight = true;
        Ok(generation)
    }

    /// Non blocking check for the result of the newest request.
    pub fn poll(&mut self) -> Option<Fetched<R>> {
        while let Ok(fetched) = self.receiver.try_recv() {
            if let Some(fetched) = self.accept(fetched) {
                return Some(fetched);
            }
        }
        None
    }

    /// Block up to `timeout` for the result of the newest request.
    pub fn wait(&mut self, timeout: Duration) -> Option<Fetched<R>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(fetched) => {
                    if let Some(fetched) = self.accept(fetched) {
                        return Some(fetched);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    fn accept(&mut self, fetched: Fetched<R>) -> Option<Fetched<R>> {
        if fetched.generation == self.generation {
            self.in_flight = false;
            Some(fetched)
        } else {
            warn!(
                "Discarding stale fetch result of generation {} (current {})",
                fetched.generation, self.generation
            );
            None
        }
    }
}
