use std::fmt;

/// Which store operation an infrastructure fault occurred in.
///
/// Used for policy decisions upstream (the poll workflow distinguishes a
/// failed scan from a failed transition) and as an observability
/// dimension in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOperation {
    Connect,
    Migrate,
    Save,
    Find,
    FindScheduled,
    FindDue,
    MarkFired,
    Delete,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Migrate => "migrate",
            Self::Save => "save",
            Self::Find => "find",
            Self::FindScheduled => "findScheduled",
            Self::FindDue => "findDue",
            Self::MarkFired => "markFired",
            Self::Delete => "delete",
        };
        write!(f, "{name}")
    }
}

/// Infrastructure fault from a timer store adapter.
///
/// Domain outcomes (missing row, already fired) are not errors — they are
/// expressed in the operation result types. This only carries adapter
/// faults: connection loss, constraint violations, corrupt rows.
#[derive(Clone, Debug, thiserror::Error)]
#[error("timer store {operation} failed: {cause}")]
pub struct StoreError {
    pub operation: StoreOperation,
    pub cause: String,
}

impl StoreError {
    pub fn new(operation: StoreOperation, cause: impl Into<String>) -> Self {
        Self {
            operation,
            cause: cause.into(),
        }
    }
}
