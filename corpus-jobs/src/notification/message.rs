//! Notification payload.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::jobs::{JobKind, JobRecord};

/// What gets delivered when a job finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobNotification {
    pub job_id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub corpus_id: String,
    pub ok: bool,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl JobNotification {
    pub fn from_record(record: &JobRecord) -> Self {
        let subject = format!("{} ({})", record.description(), record.corpus_id());
        let body = format!(
            "{}\n\nJob ID: {}\nStarted: {}\nFinished: {}",
            record.status_text(),
            record.id(),
            record.start().to_rfc3339(),
            record.update().to_rfc3339(),
        );
        Self {
            job_id: record.id().to_string(),
            kind: record.kind(),
            corpus_id: record.corpus_id().to_string(),
            ok: record.is_ok(),
            subject,
            body,
            timestamp: record.update(),
        }
    }
}
