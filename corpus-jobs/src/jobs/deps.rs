//! Dependencies between jobs.
//!
//! Keyed by the dependent job, each entry lists the parents the job waits
//! for. Parents are referenced by ID only. Edge flags are set when a parent
//! finishes and cleared again only when that parent is restarted.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use super::error::DependencyError;

/// One (dependent, parent) edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepInfo {
    pub created: DateTime<Utc>,
    pub parent_id: String,
    pub finished: bool,
    pub has_error: bool,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    deps: HashMap<String, Vec<DepInfo>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `job_id` must wait for `parent_id`.
    ///
    /// The edge is rolled back if it closes a cycle.
    pub fn add(&mut self, job_id: &str, parent_id: &str) -> Result<(), DependencyError> {
        let edges = self.deps.entry(job_id.to_string()).or_default();
        if edges.iter().any(|dep| dep.parent_id == parent_id) {
            return Err(DependencyError::DuplicateDependency);
        }
        edges.push(DepInfo {
            created: Utc::now(),
            parent_id: parent_id.to_string(),
            finished: false,
            has_error: false,
        });

        if self.has_cycle(job_id) {
            if let Some(edges) = self.deps.get_mut(job_id) {
                edges.pop();
                if edges.is_empty() {
                    self.deps.remove(job_id);
                }
            }
            return Err(DependencyError::CircularJobDependency);
        }
        Ok(())
    }

    /// Breadth-first walk along parent links; a cycle exists iff the walk
    /// gets back to `start`.
    fn has_cycle(&self, start: &str) -> bool {
        let mut visited = HashSet::new();
        let mut pending: VecDeque<&str> = self.parent_ids(start).collect();
        while let Some(node) = pending.pop_front() {
            if node == start {
                return true;
            }
            if visited.insert(node) {
                pending.extend(self.parent_ids(node));
            }
        }
        false
    }

    fn parent_ids<'a>(&'a self, job_id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.deps
            .get(job_id)
            .into_iter()
            .flatten()
            .map(|dep| dep.parent_id.as_str())
    }

    /// Mark every edge pointing at `parent_id` as finished.
    pub fn set_parent_finished(&mut self, parent_id: &str, has_error: bool) {
        for dep in self.deps.values_mut().flatten() {
            if dep.parent_id == parent_id {
                dep.finished = true;
                dep.has_error = has_error;
            }
        }
    }

    /// Mark every edge pointing at `parent_id` as pending again, the parent
    /// is about to run once more.
    pub fn reopen_parent(&mut self, parent_id: &str) {
        for dep in self.deps.values_mut().flatten() {
            if dep.parent_id == parent_id {
                dep.finished = false;
                dep.has_error = false;
            }
        }
    }

    /// Reset the edges of `job_id` from the current state of its parents.
    ///
    /// `status` returns `(finished, has_error)` of a parent, `None` leaves
    /// the edge as it is.
    pub fn refresh_edges<F>(&mut self, job_id: &str, status: F)
    where
        F: Fn(&str) -> Option<(bool, bool)>,
    {
        let Some(edges) = self.deps.get_mut(job_id) else {
            return;
        };
        for dep in edges {
            if let Some((finished, has_error)) = status(&dep.parent_id) {
                dep.finished = finished;
                dep.has_error = finished && has_error;
            }
        }
    }

    /// Whether the job still has to wait. A failed parent ends the wait.
    pub fn must_wait(&self, job_id: &str) -> Result<bool, DependencyError> {
        let edges = self.edges(job_id)?;
        let unfinished = edges.iter().any(|dep| !dep.finished);
        let failed = edges.iter().any(|dep| dep.has_error);
        Ok(unfinished && !failed)
    }

    pub fn has_failed_parent(&self, job_id: &str) -> Result<bool, DependencyError> {
        Ok(self.edges(job_id)?.iter().any(|dep| dep.has_error))
    }

    pub fn edges(&self, job_id: &str) -> Result<&[DepInfo], DependencyError> {
        self.deps
            .get(job_id)
            .map(Vec::as_slice)
            .ok_or(DependencyError::NoSuchJobDependency)
    }

    pub fn has_dependencies(&self, job_id: &str) -> bool {
        self.deps.contains_key(job_id)
    }

    /// Drop the entry of a dependent job.
    pub fn remove(&mut self, job_id: &str) -> Option<Vec<DepInfo>> {
        self.deps.remove(job_id)
    }

    /// Number of dependent jobs tracked.
    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }
}
