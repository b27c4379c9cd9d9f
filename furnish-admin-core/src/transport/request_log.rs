use super::Method;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

const MAX_REQUEST_HISTORY: usize = 100;

#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub method: Method,
    pub url: String,
    pub timestamp: OffsetDateTime,
    /// 0 when no response arrived.
    pub status_code: u16,
    pub success: bool,
}

/// Bounded history of the calls a transport made, newest last.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    records: Arc<Mutex<Vec<RequestRecord>>>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: RequestRecord) {
        if let Ok(mut history) = self.records.lock() {
            history.push(record);
            if history.len() > MAX_REQUEST_HISTORY {
                let excess = history.len() - MAX_REQUEST_HISTORY;
                history.drain(0..excess);
            }
        }
    }

    pub fn records(&self) -> Vec<RequestRecord> {
        self.records
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|history| history.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut history) = self.records.lock() {
            history.clear();
        }
    }
}
