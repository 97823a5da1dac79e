//! Background job orchestration for corpus metadata processing.
//!
//! Long running corpus operations (live attribute extraction, n-gram and
//! keyword generation, corpus synchronization) are submitted as jobs to the
//! [`jobs::Dispatcher`], which runs them with bounded concurrency, tracks
//! dependencies between them, supports cooperative cancellation and resumes
//! unfinished work after a restart.

pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod notification;

pub use error::{Error, Result};
