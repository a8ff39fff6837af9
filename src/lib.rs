//! codeledger: a code quality ledger and scoring engine.
//!
//! Detectors (external to this crate) emit candidate findings; the ledger
//! reconciles them across scans with stable identity, the scoring layer
//! turns them into tiered dimension scores in several strictness modes, and
//! the queue layer derives a deterministically ranked work list. Module
//! layering is strict: `ledger` and `scoring` know nothing about the queue
//! or the CLI.

pub mod app;
pub mod cli;
pub mod config;
pub mod import;
pub mod ledger;
pub mod logging;
pub mod queue;
pub mod scoring;
