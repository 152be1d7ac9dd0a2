//! Per-call latency recording for upstream requests.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;

/// One recorded upstream call.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub elapsed_ms: u64,
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
}

/// Status of a call that did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotOkStatus {
    pub status: u16,
    pub status_text: String,
}

/// Aggregate statistics for one HTTP method.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingSummary {
    pub total_count: usize,
    pub count: usize,
    pub mean: f64,
    pub max: u64,
    pub min: u64,
    pub num_ok: usize,
    pub num_not_ok: usize,
    pub statuses_not_ok: Vec<NotOkStatus>,
}

/// In-memory log of upstream calls, grouped by method.
///
/// Grows for the lifetime of the process; summaries can be limited to the
/// most recent calls.
#[derive(Debug, Default)]
pub struct TimingRecorder {
    records: Mutex<BTreeMap<String, Vec<TimingRecord>>>,
}

impl TimingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, method: &str, record: TimingRecord) {
        self.records
            .lock()
            .entry(method.to_string())
            .or_default()
            .push(record);
    }

    /// Summarise the last `window` calls of each method (0 means all).
    pub fn summarise(&self, window: usize) -> BTreeMap<String, TimingSummary> {
        let records = self.records.lock();
        let mut summary = BTreeMap::new();

        for (method, calls) in records.iter() {
            let take = if window == 0 {
                calls.len()
            } else {
                window.min(calls.len())
            };
            let recent = &calls[calls.len() - take..];

            let mut num_ok = 0;
            let mut statuses_not_ok = Vec::new();
            let mut sum = 0u64;
            for call in recent {
                if call.ok {
                    num_ok += 1;
                } else {
                    statuses_not_ok.push(NotOkStatus {
                        status: call.status,
                        status_text: call.status_text.clone(),
                    });
                }
                sum += call.elapsed_ms;
            }

            let count = recent.len();
            summary.insert(
                method.clone(),
                TimingSummary {
                    total_count: calls.len(),
                    count,
                    mean: if count > 0 {
                        sum as f64 / count as f64
                    } else {
                        0.0
                    },
                    max: recent.iter().map(|c| c.elapsed_ms).max().unwrap_or(0),
                    min: recent.iter().map(|c| c.elapsed_ms).min().unwrap_or(0),
                    num_ok,
                    num_not_ok: count - num_ok,
                    statuses_not_ok,
                },
            );
        }

        summary
    }
}
