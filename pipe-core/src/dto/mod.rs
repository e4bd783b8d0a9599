//! Data Transfer Objects
//!
//! Lightweight request shapes that callers hand to the store to create new
//! records. The store fills in the server-assigned fields.

pub mod execution;
