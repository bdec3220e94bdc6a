//! Bulk ingest of a JSON document stream into an index, used to seed a collection before a
//! benchmark run.
//!
//! Documents are pushed in batches; after every batch the session commits and checks the index
//! size, stopping once the size cap is exceeded.

use crate::workload::BoxError;
use loadgen_core::{DEFAULT_INGEST_BATCH_SIZE, DEFAULT_INGEST_SIZE_CAP};
use serde_json::{Deserializer, Map, Value};
use std::fmt;
use std::io::BufRead;
use thiserror::Error;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Field name to value mapping of a single document.
pub type Document = Map<String, Value>;

/// Target of a bulk ingest.
pub trait IndexClient {
    fn delete_all(&mut self) -> Result<(), BoxError>;
    fn add(&mut self, document: Document) -> Result<(), BoxError>;
    /// Block until every pending `add` has been sent.
    fn flush(&mut self) -> Result<(), BoxError>;
    fn commit(&mut self) -> Result<(), BoxError>;
    fn optimize(&mut self) -> Result<(), BoxError>;
    fn index_size_bytes(&mut self) -> Result<u64, BoxError>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IngestStage {
    DeleteAll,
    Flush,
    Commit,
    IndexSize,
    Optimize,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::DeleteAll => "delete all",
            Self::Flush => "flush",
            Self::Commit => "commit",
            Self::IndexSize => "index size",
            Self::Optimize => "optimize",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed input after {documents} documents: {source}")]
    Json {
        documents: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Index {stage} failed: {source}")]
    Index {
        stage: IngestStage,
        #[source]
        source: BoxError,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub size_cap_bytes: u64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_INGEST_BATCH_SIZE,
            size_cap_bytes: DEFAULT_INGEST_SIZE_CAP,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Documents read from the input and handed to the index.
    pub documents: u64,
    /// Documents the index refused.
    pub rejected: u64,
    /// Completed batches, each followed by a commit.
    pub batches: u64,
    pub final_size_bytes: u64,
    pub size_cap_reached: bool,
}

pub struct IngestSession<C> {
    client: C,
    options: IngestOptions,
    report: IngestReport,
    pending: usize,
}

impl<C: IndexClient> IngestSession<C> {
    pub fn new(client: C) -> Self {
        Self::with_options(client, IngestOptions::default())
    }

    pub fn with_options(client: C, mut options: IngestOptions) -> Self {
        options.batch_size = options.batch_size.max(1);
        Self {
            client,
            options,
            report: IngestReport::default(),
            pending: 0,
        }
    }

    pub fn report(&self) -> IngestReport {
        self.report
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// Replace the index contents with the documents in `input`.
    ///
    /// Top-level values which are not JSON objects are skipped.
    #[instrument(name = "ingest", skip_all)]
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<IngestReport, IngestError> {
        self.step(IngestStage::DeleteAll, |c| c.delete_all())?;
        self.step(IngestStage::Optimize, |c| c.optimize())?;
        self.step(IngestStage::Commit, |c| c.commit())?;
        info!("Cleared the index, starting ingest");

        for value in Deserializer::from_reader(input).into_iter::<Value>() {
            let value = value.map_err(|source| IngestError::Json {
                documents: self.report.documents,
                source,
            })?;

            let Value::Object(document) = value else {
                trace!("Skipping non-object value");
                continue;
            };

            self.push(document);

            if self.pending >= self.options.batch_size && self.finish_batch()? {
                break;
            }
        }

        if self.pending > 0 && !self.report.size_cap_reached {
            self.finish_batch()?;
        }

        self.step(IngestStage::Optimize, |c| c.optimize())?;
        self.step(IngestStage::Commit, |c| c.commit())?;
        self.report.final_size_bytes = self.step(IngestStage::IndexSize, |c| c.index_size_bytes())?;

        info!(
            "Ingested {} documents in {} batches ({} rejected), final index size: {} bytes",
            self.report.documents,
            self.report.batches,
            self.report.rejected,
            self.report.final_size_bytes
        );
        Ok(self.report)
    }

    fn push(&mut self, document: Document) {
        self.report.documents += 1;
        self.pending += 1;
        if let Err(err) = self.client.add(document) {
            self.report.rejected += 1;
            warn!("Document {} rejected: {err}", self.report.documents);
        }
    }

    /// Returns whether the size cap has been exceeded.
    fn finish_batch(&mut self) -> Result<bool, IngestError> {
        self.step(IngestStage::Flush, |c| c.flush())?;
        self.step(IngestStage::Commit, |c| c.commit())?;
        self.pending = 0;
        self.report.batches += 1;

        let size = self.step(IngestStage::IndexSize, |c| c.index_size_bytes())?;
        debug!(
            "Batch {} committed, {} documents, index size {size} bytes",
            self.report.batches, self.report.documents
        );

        if size > self.options.size_cap_bytes {
            info!(
                "Index size {size} exceeds the cap of {} bytes, stopping",
                self.options.size_cap_bytes
            );
            self.report.size_cap_reached = true;
        }
        Ok(self.report.size_cap_reached)
    }

    fn step<T>(
        &mut self,
        stage: IngestStage,
        f: impl FnOnce(&mut C) -> Result<T, BoxError>,
    ) -> Result<T, IngestError> {
        f(&mut self.client).map_err(|source| IngestError::Index { stage, source })
    }
}
