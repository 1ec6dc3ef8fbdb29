//! Usage metering for the resume analyzer.
//!
//! The `metering` modules decide whether a caller may run an analysis and what it costs:
//! a fixed-window limiter for signed-in users, a per-IP free allotment for anonymous
//! callers, and a persisted credit ledger that is charged once per successful analysis.
//! `LocalCreditCache` describes how a client mirrors that balance.
//!
//! The HTTP surface in `routes` wires these to axum; the binary only loads config and
//! serves the router.

pub mod analysis;
pub mod clock;
pub mod config;
pub mod errors;
pub mod metering;
pub mod routes;
pub mod state;
