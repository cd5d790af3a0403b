//! Ingestion job wire types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status reported for an ingestion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Finished,
    Failed,
    Error,
}

impl JobStatus {
    /// Polling stops at these; nothing transitions out of them
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response to a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: String,
}

/// Current status and full log of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,

    #[serde(default)]
    pub logs: Vec<String>,
}

/// A file selected for ingestion; the payload is opaque to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let snapshot: JobSnapshot =
            serde_json::from_str(r#"{"status":"running","logs":["read 10 rows"]}"#).unwrap();
        assert_eq!(snapshot.status, JobStatus::Running);
        assert!(!snapshot.status.is_terminal());

        let snapshot: JobSnapshot = serde_json::from_str(r#"{"status":"failed"}"#).unwrap();
        assert!(snapshot.status.is_terminal());
        assert!(snapshot.logs.is_empty());
    }
}
