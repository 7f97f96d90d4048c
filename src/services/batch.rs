//! Aggregate outcome of MOVE and DELETE batches.
//!
//! Skips (name filter, access denial) are warnings and still allow a
//! partial success. Backend failures are hard errors and fail the batch.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Filter,
    Access,
    UpdateRecord,
    DeleteRecord,
    MoveObject,
    DeleteObject,
}

impl fmt::Display for BatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchOp::Filter => "filter",
            BatchOp::Access => "access",
            BatchOp::UpdateRecord => "update record",
            BatchOp::DeleteRecord => "delete record",
            BatchOp::MoveObject => "move object",
            BatchOp::DeleteObject => "delete object",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchIssue {
    pub op: BatchOp,
    pub path: String,
    pub cause: String,
}

impl fmt::Display for BatchIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.op, self.path, self.cause)
    }
}

/// How a batch ended.
#[derive(Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    Done,
    Partial(String),
    Failed(String),
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub warnings: Vec<BatchIssue>,
    pub errors: Vec<BatchIssue>,
}

impl BatchReport {
    pub fn warn(&mut self, op: BatchOp, path: &str, cause: impl fmt::Display) {
        self.warnings.push(BatchIssue {
            op,
            path: path.to_string(),
            cause: cause.to_string(),
        });
    }

    pub fn fail(&mut self, op: BatchOp, path: &str, cause: impl fmt::Display) {
        self.errors.push(BatchIssue {
            op,
            path: path.to_string(),
            cause: cause.to_string(),
        });
    }

    /// Any hard error fails the batch; otherwise warnings make it partial.
    pub fn outcome(&self) -> BatchOutcome {
        if !self.errors.is_empty() {
            BatchOutcome::Failed(join(&self.errors))
        } else if !self.warnings.is_empty() {
            BatchOutcome::Partial(join(&self.warnings))
        } else {
            BatchOutcome::Done
        }
    }
}

fn join(issues: &[BatchIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
