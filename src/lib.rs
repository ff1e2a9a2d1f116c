//! Sandboxed execution of dynamically produced data-analysis code.
//!
//! A caller submits Python analysis code written against an in-memory
//! tabular dataset; tabexec runs it in a child-process sandbox, captures
//! stdout, chart artifacts, and generated dataset files, and, when the
//! code fails, drives a bounded self-correction cycle that feeds a
//! sanitized diagnostic back to whatever produced the code. A remote mode
//! exposes the same contract over HTTP, backed by an LRU dataset cache.

pub mod cache;
pub mod cli;
pub mod config;
pub mod correction;
pub mod dataset;
pub mod envelope;
pub mod error;
pub mod exec;
pub mod remote;
pub mod sanitize;
pub mod server;
