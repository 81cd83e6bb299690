//! Bounded in-memory record of fetch attempts.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;
use time::Duration;

use crate::data_source::Endpoint;
use crate::{SourceId, UtcDateTime};

const DEFAULT_CAPACITY: usize = 256;
const FRESH_FOR: Duration = Duration::hours(2);
const STALE_FOR: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Failed,
    Skipped,
}

/// One attempt against one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRecord {
    pub source: SourceId,
    pub endpoint: Endpoint,
    pub query: String,
    pub status: FetchStatus,
    pub records_processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: UtcDateTime,
    pub latency_ms: u64,
}

/// Age label of the last successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFreshness {
    Fresh,
    Stale,
    Outdated,
    Never,
}

impl DataFreshness {
    pub fn from_age(age: Option<Duration>) -> Self {
        match age {
            None => Self::Never,
            Some(age) if age < FRESH_FOR => Self::Fresh,
            Some(age) if age < STALE_FOR => Self::Stale,
            Some(_) => Self::Outdated,
        }
    }
}

/// Per-source summary derived from the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataStatus {
    pub source: SourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<UtcDateTime>,
    pub freshness: DataFreshness,
    pub attempts: usize,
    pub failures: usize,
}

#[derive(Debug)]
pub struct FetchLog {
    capacity: usize,
    records: Mutex<VecDeque<FetchRecord>>,
}

impl Default for FetchLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl FetchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Appends a record, dropping the oldest once the log is full.
    pub fn record(&self, record: FetchRecord) {
        let mut records = self.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Records, oldest first.
    pub fn records(&self) -> Vec<FetchRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Status of every source that appears in `sources` or in the log.
    pub fn data_status(&self, sources: &[SourceId]) -> Vec<DataStatus> {
        self.data_status_at(sources, UtcDateTime::now())
    }

    pub fn data_status_at(&self, sources: &[SourceId], now: UtcDateTime) -> Vec<DataStatus> {
        let mut by_source = sources
            .iter()
            .map(|source| {
                (
                    *source,
                    DataStatus {
                        source: *source,
                        last_success: None,
                        freshness: DataFreshness::Never,
                        attempts: 0,
                        failures: 0,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        for record in self.lock().iter() {
            let status = by_source.entry(record.source).or_insert_with(|| DataStatus {
                source: record.source,
                last_success: None,
                freshness: DataFreshness::Never,
                attempts: 0,
                failures: 0,
            });
            match record.status {
                FetchStatus::Success => {
                    status.attempts += 1;
                    if status.last_success.is_none_or(|last| last < record.at) {
                        status.last_success = Some(record.at);
                    }
                }
                FetchStatus::Failed => {
                    status.attempts += 1;
                    status.failures += 1;
                }
                FetchStatus::Skipped => {}
            }
        }

        by_source
            .into_values()
            .map(|mut status| {
                let age = status
                    .last_success
                    .map(|last| now.into_inner() - last.into_inner());
                status.freshness = DataFreshness::from_age(age);
                status
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<FetchRecord>> {
        self.records
            .lock()
            .expect("fetch log lock should not be poisoned")
    }
}
