//! Pipe Core
//!
//! Core types and abstractions for the Pipe orchestration store.
//!
//! This crate contains:
//! - Domain types: resources, execution records, logs and pipeline specs
//! - DTOs: request shapes used to create new records
//! - Metrics: an explicitly passed registry of counters, gauges and histograms

pub mod domain;
pub mod dto;
pub mod error;
pub mod metrics;
