use std::collections::VecDeque;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Summary of one finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub command: String,
    pub interactive: bool,
    pub started_at: SystemTime,
    /// `None` when the process never started or could not be reaped.
    pub return_code: Option<i32>,
    pub elapsed: Duration,
    /// Ended by a caller `stop()` rather than on its own.
    pub stopped: bool,
}

impl SessionRecord {
    pub fn succeeded(&self) -> bool {
        self.return_code == Some(0)
    }
}

/// Most recent sessions, oldest first.
#[derive(Debug)]
pub struct SessionHistory {
    records: VecDeque<SessionRecord>,
    limit: usize,
}

impl SessionHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit,
        }
    }

    pub fn push(&mut self, record: SessionRecord) {
        if self.limit == 0 {
            return;
        }
        while self.records.len() >= self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
