//! Sequential external identifiers.
//!
//! Every entity carries a zero-padded, monotonic id (`PID000001`,
//! `WID00000001`, `TID0000000001`). The numeric part comes from a counter
//! row advanced inside the same transaction that consumes the new id, so
//! ids stay unique across restarts and concurrent writers.

/// The three id-counter kinds persisted in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Project,
    Workflow,
    Task,
}

impl IdKind {
    /// Prefix of the formatted id
    pub fn prefix(&self) -> &'static str {
        match self {
            IdKind::Project => "PID",
            IdKind::Workflow => "WID",
            IdKind::Task => "TID",
        }
    }

    /// Zero-padding width of the numeric part
    pub fn padding(&self) -> usize {
        match self {
            IdKind::Project => 6,
            IdKind::Workflow => 8,
            IdKind::Task => 10,
        }
    }

    /// Key of the counter row backing this kind
    pub fn counter_key(&self) -> &'static str {
        match self {
            IdKind::Project => "project",
            IdKind::Workflow => "workflow",
            IdKind::Task => "task",
        }
    }

    /// Format a counter value as an external id
    pub fn format(&self, value: i64) -> String {
        format!("{}{:0width$}", self.prefix(), value, width = self.padding())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_formatting() {
        assert_eq!(IdKind::Project.format(1), "PID000001");
        assert_eq!(IdKind::Workflow.format(1), "WID00000001");
        assert_eq!(IdKind::Task.format(1), "TID0000000001");
        assert_eq!(IdKind::Task.format(1234567890), "TID1234567890");
    }

    #[test]
    fn test_padding_overflow_keeps_digits() {
        // Values wider than the padding are kept intact rather than truncated
        assert_eq!(IdKind::Project.format(12345678), "PID12345678");
    }

    #[test]
    fn test_counter_keys() {
        assert_eq!(IdKind::Project.counter_key(), "project");
        assert_eq!(IdKind::Workflow.counter_key(), "workflow");
        assert_eq!(IdKind::Task.counter_key(), "task");
    }
}
