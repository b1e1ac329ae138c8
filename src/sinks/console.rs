//! Console sink: logfmt lines on stderr

use crate::core::{DiagnosticSink, FieldValue, LogEntry};
#[cfg(feature = "console")]
use colored::Colorize;
use std::io::Write;

/// Writes `level=ERROR msg="..." key=value` lines to stderr
///
/// No timestamp is printed; the host process's own logger already stamps
/// its output and these lines usually end up interleaved with it.
pub struct ConsoleSink {
    use_colors: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            use_colors: cfg!(feature = "console"),
        }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Format without colors
    pub fn format(entry: &LogEntry) -> String {
        Self::format_with(entry, entry.level.to_str().to_string())
    }

    fn format_with(entry: &LogEntry, level: String) -> String {
        let mut parts = vec![
            format!("level={}", level),
            format!("msg={}", quote_value(&entry.message)),
        ];

        let mut fields: Vec<_> = entry.fields.fields().iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in fields {
            let formatted = match value {
                FieldValue::String(s) => escape_value(s),
                other => other.to_string(),
            };
            parts.push(format!("{}={}", escape_key(key), formatted));
        }

        parts.join(" ")
    }

    #[cfg(feature = "console")]
    fn level_label(&self, entry: &LogEntry) -> String {
        if self.use_colors {
            entry
                .level
                .to_str()
                .color(entry.level.color_code())
                .to_string()
        } else {
            entry.level.to_str().to_string()
        }
    }

    #[cfg(not(feature = "console"))]
    fn level_label(&self, entry: &LogEntry) -> String {
        let _ = self.use_colors;
        entry.level.to_str().to_string()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink for ConsoleSink {
    fn write(&self, entry: &LogEntry) {
        let line = Self::format_with(entry, self.level_label(entry));
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        // Nowhere left to report a failing stderr
        let _ = writeln!(handle, "{}", line);
    }

    fn name(&self) -> &str {
        "console"
    }
}

fn escape_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
        .collect()
}

/// Quote empty values and values that would break key=value parsing
fn escape_value(value: &str) -> String {
    if value.is_empty() || value.contains([' ', '"', '=']) {
        quote_value(value)
    } else {
        value.to_string()
    }
}

fn quote_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
