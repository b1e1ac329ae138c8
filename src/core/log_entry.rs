//! Log entry structure handed to hooks

use super::log_level::LogLevel;
use super::record::{FieldValue, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Structured fields; these become the persisted record
    #[serde(default, skip_serializing_if = "Record::is_empty")]
    pub fields: Record,
}

impl LogEntry {
    /// Sanitize log message to prevent log injection attacks
    ///
    /// Replaces newlines, carriage returns, and tabs with escape sequences
    /// to prevent attackers from injecting fake log entries.
    fn sanitize_message(message: &str) -> String {
        message
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: Self::sanitize_message(&message.into()),
            timestamp: Utc::now(),
            fields: Record::new(),
        }
    }

    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key, value);
        self
    }

    pub fn with_fields(mut self, fields: Record) -> Self {
        self.fields = fields;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_sanitized() {
        let entry = LogEntry::new(LogLevel::Info, "line one\nERROR fake");
        assert_eq!(entry.message, "line one\\nERROR fake");
    }

    #[test]
    fn test_fields_builder() {
        let entry = LogEntry::new(LogLevel::Warn, "slow upstream")
            .with_field("upstream_response_time", 2.5)
            .with_field("status", "504");

        assert_eq!(entry.fields.len(), 2);
        assert_eq!(entry.fields.get("status"), Some(&FieldValue::from("504")));
    }
}
