//! Test helpers module
//!
//! Shared fixtures for the ShiftPool integration suites: an in-memory service
//! context with a manual clock, a recording push sender and a PostgreSQL
//! database helper.

#![allow(dead_code)]

pub mod database_helper;
pub mod test_context;
pub mod test_data;

pub use database_helper::*;
pub use test_context::*;
pub use test_data::*;
