//! Rate-distortion layer selection for layered video codestreams.
//!
//! ## Technical Overview
//!
//! A motion-compensated temporal transform plus spatial wavelet produces a
//! codestream organized as independent per-subband, per-frame
//! sub-codestreams, each split into quality layers. Given a transmission
//! budget, this crate decides how many layers of each subband to keep so
//! that the reconstruction distortion is minimized for the rate spent.
//!
//! ### Moving parts
//!
//! 1. A candidate allocation is truncated, reconstructed and measured by
//!    external codec tools behind the [`tools::Toolchain`] seam.
//! 2. The evaluator ([`evaluate::SearchRun`]) derives an R-D slope for the
//!    candidate against the run's reference point and tracks the best
//!    candidate found so far.
//! 3. A search strategy ([`strategy`]) decides which candidate to try
//!    next, from the exhaustive full search down to fixed transmission
//!    orders, either over the whole video or GOP by GOP ([`scope`]).
//! 4. Per-GOP rate/distortion curves are folded into the final weighted
//!    curve ([`curve`]) and written as plain-text artifacts ([`report`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rdopt::params::Params;
//! use rdopt::report::Reporter;
//! use rdopt::scope::{self, NullProgress};
//! use rdopt::strategy::{Algorithm, RunContext};
//! use rdopt::tools::ShellToolchain;
//! use rdopt::workspace::Workspace;
//!
//! let mut params = Params::default();
//! params.resolve_discards()?;
//! let ws = Workspace::new(".");
//! let tools = ShellToolchain::default();
//! let reporter = Reporter::new(ws.clone(), &params);
//! let ctx = RunContext {
//!     params: &params,
//!     tools: &tools,
//!     ws: &ws,
//!     reporter: &reporter,
//! };
//! scope::run(Algorithm::FullSearch, &ctx, &NullProgress)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Allocation and reduction vectors: the unit of evaluation.
pub mod alloc;

/// Per-GOP rate/distortion curves and their aggregation.
pub mod curve;

/// The bit-allocation evaluator driving the external tools.
pub mod evaluate;

/// The per-candidate truncation sweep.
pub mod extract;

/// Subband and GOP geometry derivations.
pub mod geometry;

/// Resolved run configuration.
pub mod params;

/// Rate accounting over the extraction ledger.
pub mod rate;

/// Plain-text run artifacts.
pub mod report;

/// Whole-video vs per-GOP scope control.
pub mod scope;

/// The search strategies.
pub mod strategy;

/// External tool contracts and the process-backed toolchain.
pub mod tools;

/// Error types and the fail-level escalation macro.
pub mod utils;

/// Working-directory layout and raw-frame file surgery.
pub mod workspace;

#[cfg(test)]
pub(crate) mod testutil;
