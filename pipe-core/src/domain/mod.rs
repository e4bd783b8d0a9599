//! Core domain types
//!
//! These types are the persisted shapes shared between the store (which owns
//! them durably) and the schedulers and API layers that read them back.

pub mod event;
pub mod execution;
pub mod log;
pub mod pipeline;
pub mod resource;
