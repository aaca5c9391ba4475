//! Bounded ring buffer of recently issued command texts.
//!
//! Owned by whichever surface fronts the command box (server, CLI); the
//! execution core never reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub text: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CommandHistory {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Record a command, evicting the oldest entry past capacity.
    pub fn push(&mut self, text: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            text: text.into(),
            issued_at: Utc::now(),
        });
    }

    /// Entries, most recent first.
    pub fn recent(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
