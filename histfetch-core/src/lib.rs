//! histfetch core: paged historical price retrieval.
//!
//! This crate contains:
//! - Domain types (rows, fetch windows, request specs)
//! - Provider sources for a monthly CSV quote API and an exchange klines API
//! - The paged fetcher: windowing, pacing, retry, and error policy
//! - Assembly (sort + de-duplicate) and CSV output
//! - Credentials and TOML job configuration

pub mod config;
pub mod data;
pub mod domain;
pub mod testing;
