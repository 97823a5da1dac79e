//! Pending job queue.
//!
//! A singly linked FIFO kept in an arena. Links are slot indices, freed slots
//! are recycled through a free list.

use std::fmt;

use super::error::QueueError;
use super::record::JobRecord;
use super::task::JobTask;

/// A submitted job waiting to be dispatched.
pub struct QueueEntry {
    pub task: JobTask,
    pub record: JobRecord,
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

struct Slot {
    entry: Option<QueueEntry>,
    next: Option<usize>,
}

/// FIFO of pending jobs with a single reordering primitive, [`delay_next`].
///
/// [`delay_next`]: JobQueue::delay_next
#[derive(Default)]
pub struct JobQueue {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail.
    pub fn enqueue(&mut self, task: JobTask, record: JobRecord) {
        let slot = Slot {
            entry: Some(QueueEntry { task, record }),
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        match self.tail {
            Some(tail) => self.slots[tail].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Remove and return the head.
    pub fn dequeue(&mut self) -> Result<QueueEntry, QueueError> {
        let idx = self.head.ok_or(QueueError::EmptyQueue)?;
        let slot = &mut self.slots[idx];
        let entry = slot.entry.take().ok_or(QueueError::EmptyQueue)?;
        self.head = slot.next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.free.push(idx);
        Ok(entry)
    }

    /// ID of the head job.
    pub fn peek_id(&self) -> Result<&str, QueueError> {
        self.head
            .and_then(|idx| self.slots[idx].entry.as_ref())
            .map(|entry| entry.record.id())
            .ok_or(QueueError::EmptyQueue)
    }

    /// Number of pending jobs. Walks the list.
    pub fn size(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Move the head to the second position. A single entry stays put.
    pub fn delay_next(&mut self) -> Result<(), QueueError> {
        let first = self.head.ok_or(QueueError::EmptyQueue)?;
        let Some(second) = self.slots[first].next else {
            return Ok(());
        };
        self.slots[first].next = self.slots[second].next;
        self.slots[second].next = Some(first);
        self.head = Some(second);
        if self.tail == Some(second) {
            self.tail = Some(first);
        }
        Ok(())
    }

    /// Unlink the entry of `job_id`, wherever it sits in the queue.
    pub fn remove(&mut self, job_id: &str) -> Option<QueueEntry> {
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let next = self.slots[idx].next;
            let found = self.slots[idx]
                .entry
                .as_ref()
                .is_some_and(|entry| entry.record.id() == job_id);
            if found {
                match prev {
                    Some(prev) => self.slots[prev].next = next,
                    None => self.head = next,
                }
                if self.tail == Some(idx) {
                    self.tail = prev;
                }
                let slot = &mut self.slots[idx];
                slot.next = None;
                let entry = slot.entry.take();
                self.free.push(idx);
                return entry;
            }
            prev = Some(idx);
            cursor = next;
        }
        None
    }

    /// Pending records in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &JobRecord> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let idx = cursor?;
            let slot = &self.slots[idx];
            cursor = slot.next;
            slot.entry.as_ref().map(|entry| &entry.record)
        })
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|record| record.id()))
            .finish()
    }
}
