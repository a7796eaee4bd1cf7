use crate::core::apdu::CardIdentifier;
use anyhow::{Context as AnyhowContext, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One card number delivered to the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRecord {
    pub card_number: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded log of delivered card numbers, oldest first
#[derive(Debug, Clone)]
pub struct ReadHistory {
    entries: VecDeque<ReadRecord>,
    limit: usize,
}

impl ReadHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Append a read unless it repeats the latest entry; returns whether it was added
    pub fn record(&mut self, identifier: &CardIdentifier) -> bool {
        let card_number = identifier.to_hex();
        if self
            .entries
            .back()
            .is_some_and(|last| last.card_number == card_number)
        {
            return false;
        }

        self.entries.push_back(ReadRecord {
            card_number,
            timestamp: Utc::now(),
        });
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first
    pub fn newest_first(&self) -> impl Iterator<Item = &ReadRecord> {
        self.entries.iter().rev()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Export history to JSON
    pub fn export_history(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.entries).context("Failed to serialize read history")
    }

    /// Import history from JSON, keeping the limit and skipping repeats of the latest entry
    pub fn import_history(&mut self, json: &str) -> Result<()> {
        let imported: Vec<ReadRecord> =
            serde_json::from_str(json).context("Failed to deserialize read history")?;

        for record in imported {
            if self
                .entries
                .back()
                .is_some_and(|last| last.card_number == record.card_number)
            {
                continue;
            }
            self.entries.push_back(record);
        }
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
        Ok(())
    }
}

impl Default for ReadHistory {
    fn default() -> Self {
        Self::new(100)
    }
}
