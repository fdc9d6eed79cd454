use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    /// Flight plan validation results for the current candidate.
    Validation,
    /// Routing graph changes and rule traces.
    Graph,
    Debug,
    /// Server `normal` messages plus client-side notices and errors.
    General,
}

impl LogCategory {
    /// Category for a server `log` item; `None` for items we don't know.
    pub fn from_item(item: &str) -> Option<Self> {
        match item {
            "fplvalidation" => Some(LogCategory::Validation),
            "graphchange" | "graphrule" | "graphruledesc" | "graphruleoprgoal" => {
                Some(LogCategory::Graph)
            }
            "normal" => Some(LogCategory::General),
            item if item.starts_with("debug") => Some(LogCategory::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogCategory::Validation => "validation",
            LogCategory::Graph => "graph",
            LogCategory::Debug => "debug",
            LogCategory::General => "log",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub category: LogCategory,
    /// Server item name, or `error`/`info` for client-side entries.
    pub item: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogUpdate {
    Appended(LogEntry),
    ValidationCleared,
}

/// Bounded log buffers, one per category.
#[derive(Debug)]
pub struct LogBook {
    capacity: usize,
    validation: VecDeque<LogEntry>,
    graph: VecDeque<LogEntry>,
    debug: VecDeque<LogEntry>,
    general: VecDeque<LogEntry>,
    /// Set by an empty validation frame: the next one starts a fresh log.
    validation_cleared: bool,
}

impl LogBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            validation: VecDeque::new(),
            graph: VecDeque::new(),
            debug: VecDeque::new(),
            general: VecDeque::new(),
            validation_cleared: false,
        }
    }

    pub fn entries(&self, category: LogCategory) -> &VecDeque<LogEntry> {
        match category {
            LogCategory::Validation => &self.validation,
            LogCategory::Graph => &self.graph,
            LogCategory::Debug => &self.debug,
            LogCategory::General => &self.general,
        }
    }

    /// Apply one server `log` frame.
    pub fn record_item(&mut self, item: &str, text: Option<String>) -> Option<LogUpdate> {
        let category = LogCategory::from_item(item)?;
        let text = text.unwrap_or_default();
        if category == LogCategory::Validation {
            if text.is_empty() {
                self.validation.clear();
                self.validation_cleared = true;
                return Some(LogUpdate::ValidationCleared);
            }
            if std::mem::take(&mut self.validation_cleared) {
                self.validation.clear();
            }
        }
        Some(LogUpdate::Appended(self.push(category, item, text)))
    }

    pub fn info(&mut self, text: impl Into<String>) -> LogEntry {
        self.push(LogCategory::General, "info", text.into())
    }

    pub fn error(&mut self, text: impl Into<String>) -> LogEntry {
        self.push(LogCategory::General, "error", text.into())
    }

    /// Forget everything tied to the finished session; the general log stays.
    pub fn reset_session(&mut self) {
        self.validation.clear();
        self.graph.clear();
        self.debug.clear();
        self.validation_cleared = false;
    }

    fn push(&mut self, category: LogCategory, item: &str, text: String) -> LogEntry {
        let entry = LogEntry {
            category,
            item: item.to_string(),
            text,
        };
        let capacity = self.capacity;
        let buffer = match category {
            LogCategory::Validation => &mut self.validation,
            LogCategory::Graph => &mut self.graph,
            LogCategory::Debug => &mut self.debug,
            LogCategory::General => &mut self.general,
        };
        if buffer.len() == capacity {
            buffer.pop_front();
        }
        buffer.push_back(entry.clone());
        entry
    }
}
