//! Job records.
//!
//! A [`JobRecord`] is a closed sum over the job kinds the service knows how to
//! run. Records are plain values: every state change produces a new record,
//! which then replaces the previous one in the dispatcher registry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Fields shared by all job kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    pub id: String,
    pub corpus_id: String,
    pub start: DateTime<Utc>,
    pub update: DateTime<Utc>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub num_restarts: u32,
}

impl JobMeta {
    /// Fresh metadata with a generated ID.
    pub fn new(corpus_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            corpus_id: corpus_id.into(),
            start: now,
            update: now,
            finished: false,
            error: None,
            num_restarts: 0,
        }
    }

    /// Refresh the update timestamp.
    pub fn touch(&mut self) {
        self.update = Utc::now();
    }
}

/// Discriminator of a [`JobRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    #[serde(rename = "liveattrs")]
    LiveAttrs,
    #[serde(rename = "liveattrs-idx-update")]
    IdxUpdate,
    #[serde(rename = "ngram-and-qs-generating")]
    Ngram,
    #[serde(rename = "keywords-build")]
    Keywords,
    #[serde(rename = "sync-cnk")]
    CorpusSync,
    #[serde(rename = "dummy-job")]
    Dummy,
}

impl JobKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LiveAttrs => "liveattrs",
            Self::IdxUpdate => "liveattrs-idx-update",
            Self::Ngram => "ngram-and-qs-generating",
            Self::Keywords => "keywords-build",
            Self::CorpusSync => "sync-cnk",
            Self::Dummy => "dummy-job",
        }
    }

    /// Human readable description used in notifications.
    pub const fn description(&self) -> &'static str {
        match self {
            Self::LiveAttrs => "Live attributes data extraction and generation",
            Self::IdxUpdate => "Live attributes index update",
            Self::Ngram => "N-grams and query suggestion data generation",
            Self::Keywords => "Keywords data generation",
            Self::CorpusSync => "Corpus data synchronization",
            Self::Dummy => "Testing and debugging empty job",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Per-kind payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveAttrsArgs {
    pub append: bool,
    pub no_corpus_db_update: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagset_attr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagset_name: Option<String>,
    /// Extractor configuration, opaque to the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extractor_conf: Option<Value>,
}

/// Live attribute extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveAttrsJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliased_corpus_id: Option<String>,
    #[serde(default)]
    pub processed_atoms: u64,
    #[serde(default)]
    pub processed_lines: u64,
    #[serde(default)]
    pub args: LiveAttrsArgs,
}

impl LiveAttrsJob {
    pub fn new(corpus_id: impl Into<String>, args: LiveAttrsArgs) -> Self {
        Self {
            meta: JobMeta::new(corpus_id),
            aliased_corpus_id: None,
            processed_atoms: 0,
            processed_lines: 0,
            args,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliased_corpus_id = Some(alias.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdxUpdateArgs {
    pub max_columns: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdxUpdateResult {
    pub used_indexes: Vec<String>,
    pub removed_indexes: Vec<String>,
}

/// Live attribute index update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdxUpdateJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    #[serde(default)]
    pub args: IdxUpdateArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<IdxUpdateResult>,
}

impl IdxUpdateJob {
    pub fn new(corpus_id: impl Into<String>, args: IdxUpdateArgs) -> Self {
        Self {
            meta: JobMeta::new(corpus_id),
            args,
            result: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NgramResult {
    pub tables_ready: bool,
    pub total_lines: u64,
    pub num_proc_lines: u64,
    pub curr_action: String,
    pub chunk_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_warn: Option<String>,
}

/// N-gram and query suggestion generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NgramJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<NgramResult>,
}

impl NgramJob {
    pub fn new(corpus_id: impl Into<String>) -> Self {
        Self {
            meta: JobMeta::new(corpus_id),
            result: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeywordsArgs {
    pub reference_verticals: Vec<String>,
    pub focus_verticals: Vec<String>,
    pub word_col_idx: usize,
    pub lemma_col_idx: usize,
    pub tag_col_idx: usize,
    pub ngram_size: usize,
    pub sentence_struct: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeywordsResult {
    pub tables_ready: bool,
    pub total_lines: u64,
    pub num_proc_lines: u64,
    pub num_stop_words: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_warn: Option<String>,
}

/// Keyword mining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordsJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    #[serde(default)]
    pub args: KeywordsArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<KeywordsResult>,
}

impl KeywordsJob {
    pub fn new(corpus_id: impl Into<String>, args: KeywordsArgs) -> Self {
        Self {
            meta: JobMeta::new(corpus_id),
            args,
            result: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirInfo {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_mod: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncResult {
    pub ok: bool,
    pub return_code: i32,
    pub details: Vec<String>,
    pub src_dir: DirInfo,
    pub dst_dir: DirInfo,
}

/// Corpus data synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusSyncJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SyncResult>,
}

impl CorpusSyncJob {
    pub fn new(corpus_id: impl Into<String>) -> Self {
        Self {
            meta: JobMeta::new(corpus_id),
            result: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DummyArgs {
    pub duration_ms: u64,
    pub fail: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DummyResult {
    pub payload: String,
}

/// No-op job used for testing the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DummyJob {
    #[serde(flatten)]
    pub meta: JobMeta,
    #[serde(default)]
    pub args: DummyArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<DummyResult>,
}

impl DummyJob {
    pub fn new(corpus_id: impl Into<String>, args: DummyArgs) -> Self {
        Self {
            meta: JobMeta::new(corpus_id),
            args,
            result: None,
        }
    }
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// Current state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobRecord {
    #[serde(rename = "liveattrs")]
    LiveAttrs(LiveAttrsJob),
    #[serde(rename = "liveattrs-idx-update")]
    IdxUpdate(IdxUpdateJob),
    #[serde(rename = "ngram-and-qs-generating")]
    Ngram(NgramJob),
    #[serde(rename = "keywords-build")]
    Keywords(KeywordsJob),
    #[serde(rename = "sync-cnk")]
    CorpusSync(CorpusSyncJob),
    #[serde(rename = "dummy-job")]
    Dummy(DummyJob),
}

macro_rules! each_kind {
    ($rec:expr, $job:ident => $body:expr) => {
        match $rec {
            JobRecord::LiveAttrs($job) => $body,
            JobRecord::IdxUpdate($job) => $body,
            JobRecord::Ngram($job) => $body,
            JobRecord::Keywords($job) => $body,
            JobRecord::CorpusSync($job) => $body,
            JobRecord::Dummy($job) => $body,
        }
    };
}

impl JobRecord {
    pub fn meta(&self) -> &JobMeta {
        each_kind!(self, job => &job.meta)
    }

    fn meta_mut(&mut self) -> &mut JobMeta {
        each_kind!(self, job => &mut job.meta)
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::LiveAttrs(_) => JobKind::LiveAttrs,
            Self::IdxUpdate(_) => JobKind::IdxUpdate,
            Self::Ngram(_) => JobKind::Ngram,
            Self::Keywords(_) => JobKind::Keywords,
            Self::CorpusSync(_) => JobKind::CorpusSync,
            Self::Dummy(_) => JobKind::Dummy,
        }
    }

    /// Corpus the job reports as its own. For live attributes this is the
    /// aliased corpus when one is set.
    pub fn corpus_id(&self) -> &str {
        match self {
            Self::LiveAttrs(job) => job
                .aliased_corpus_id
                .as_deref()
                .unwrap_or(&job.meta.corpus_id),
            _ => &self.meta().corpus_id,
        }
    }

    /// Raw dataset (corpus) identifier, ignoring any alias.
    pub fn dataset_id(&self) -> &str {
        &self.meta().corpus_id
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.meta().start
    }

    pub fn update(&self) -> DateTime<Utc> {
        self.meta().update
    }

    pub fn is_finished(&self) -> bool {
        self.meta().finished
    }

    pub fn error(&self) -> Option<&str> {
        self.meta().error.as_deref()
    }

    pub fn num_restarts(&self) -> u32 {
        self.meta().num_restarts
    }

    /// Whether the job is (so far) considered successful.
    pub fn is_ok(&self) -> bool {
        if self.error().is_some() {
            return false;
        }
        match self {
            Self::CorpusSync(job) => job.result.as_ref().is_none_or(|r| r.ok),
            Self::Dummy(job) => job.result.is_some(),
            _ => true,
        }
    }

    /// Copy of this record marked finished. Error and result are kept.
    pub fn as_finished(&self) -> Self {
        let mut next = self.clone();
        let meta = next.meta_mut();
        meta.finished = true;
        meta.touch();
        next
    }

    /// Copy of this record finished with the given error.
    pub fn with_error(&self, err: impl fmt::Display) -> Self {
        let mut next = self.clone();
        let meta = next.meta_mut();
        meta.error = Some(err.to_string());
        meta.finished = true;
        meta.touch();
        next
    }

    /// Copy of this record prepared for another attempt.
    pub fn for_restart(&self) -> Self {
        let mut next = self.clone();
        let meta = next.meta_mut();
        let now = Utc::now();
        meta.start = now;
        meta.update = now;
        meta.finished = false;
        meta.error = None;
        meta.num_restarts += 1;
        next
    }

    /// Copy of this record with a refreshed update time.
    pub fn touched(&self) -> Self {
        let mut next = self.clone();
        next.meta_mut().touch();
        next
    }

    pub fn compact(&self) -> CompactJobView {
        let meta = self.meta();
        CompactJobView {
            id: meta.id.clone(),
            kind: self.kind(),
            corpus_id: self.corpus_id().to_string(),
            start: meta.start,
            update: meta.update,
            finished: meta.finished,
            ok: self.is_ok(),
        }
    }

    pub fn full(&self) -> FullJobView {
        let (args, result) = match self {
            Self::LiveAttrs(job) => (
                to_value(&job.args),
                serde_json::json!({
                    "processedAtoms": job.processed_atoms,
                    "processedLines": job.processed_lines,
                }),
            ),
            Self::IdxUpdate(job) => (to_value(&job.args), to_value(&job.result)),
            Self::Ngram(job) => (Value::Null, to_value(&job.result)),
            Self::Keywords(job) => (to_value(&job.args), to_value(&job.result)),
            Self::CorpusSync(job) => (Value::Null, to_value(&job.result)),
            Self::Dummy(job) => (to_value(&job.args), to_value(&job.result)),
        };
        let meta = self.meta();
        FullJobView {
            id: meta.id.clone(),
            kind: self.kind(),
            corpus_id: self.corpus_id().to_string(),
            start: meta.start,
            update: meta.update,
            finished: meta.finished,
            ok: self.is_ok(),
            error: meta.error.clone(),
            num_restarts: meta.num_restarts,
            args,
            result,
        }
    }

    pub fn description(&self) -> &'static str {
        self.kind().description()
    }

    /// One-sentence outcome, used in notifications.
    pub fn status_text(&self) -> String {
        match self.error() {
            None => "Job finished without errors".to_string(),
            Some(err) => format!("Job finished with error: {err}"),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

macro_rules! impl_from_job {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for JobRecord {
                fn from(job: $ty) -> Self {
                    JobRecord::$variant(job)
                }
            }
        )*
    };
}

impl_from_job!(
    LiveAttrs(LiveAttrsJob),
    IdxUpdate(IdxUpdateJob),
    Ngram(NgramJob),
    Keywords(KeywordsJob),
    CorpusSync(CorpusSyncJob),
    Dummy(DummyJob),
);

/// List projection of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactJobView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub corpus_id: String,
    pub start: DateTime<Utc>,
    pub update: DateTime<Utc>,
    pub finished: bool,
    pub ok: bool,
}

/// Detail projection of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullJobView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub corpus_id: String,
    pub start: DateTime<Utc>,
    pub update: DateTime<Utc>,
    pub finished: bool,
    pub ok: bool,
    pub error: Option<String>,
    pub num_restarts: u32,
    pub args: Value,
    pub result: Value,
}
