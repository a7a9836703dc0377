//! # boldmetrics parallel
//!
//! Execution strategies for running independent estimator work items
//! (atlases, subjects, maps) concurrently.
//!
//! Every work item keeps a full signal and its derived arrays resident, so the
//! useful level of concurrency is bounded by memory rather than core count.
//! [`ProcessingMode::ParallelWith`] lets callers pick that bound explicitly.

pub mod strategy;

pub use strategy::{num_cpus, ParallelStrategy, ProcessingMode};
