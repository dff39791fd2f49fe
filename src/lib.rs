// src/lib.rs

//! Listing tracker library
//!
//! Normalizes scraped listings into keyed entities, compares them against the
//! last stored snapshot and reports what was added, removed or modified.

pub mod config;
pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod utils;
