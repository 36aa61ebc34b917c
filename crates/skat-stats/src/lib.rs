//! Signature aggregation, decision rules and reports over solver feeds.

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod decision;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod trap;
