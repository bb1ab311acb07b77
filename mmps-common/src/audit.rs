//! Session audit-log naming
//!
//! Each session writes its own log file named after a SHA-256 of the problem
//! statement plus the session start time, so repeated runs of the same prompt
//! never collide.

use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Timestamp format mixed into the audit hash
pub const AUDIT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Hex SHA-256 of `problem` followed by the formatted start time
pub fn session_hash(problem: &str, started_at: &NaiveDateTime) -> String {
    let mut hasher = Sha256::new();
    hasher.update(problem.as_bytes());
    hasher.update(started_at.format(AUDIT_TIME_FORMAT).to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Audit file name: `job_<hash>.log`
pub fn audit_log_filename(problem: &str, started_at: &NaiveDateTime) -> String {
    format!("job_{}.log", session_hash(problem, started_at))
}

/// Full audit file path inside `directory`
pub fn audit_log_path(directory: &Path, problem: &str, started_at: &NaiveDateTime) -> PathBuf {
    directory.join(audit_log_filename(problem, started_at))
}
