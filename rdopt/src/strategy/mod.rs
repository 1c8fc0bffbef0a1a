//! Search strategies.
//!
//! Every strategy produces candidate allocations, hands them to the
//! evaluator, and decides from the outcome whether to keep exploring. They
//! differ in how candidates are generated and when they stop:
//!
//! 1. **Full search** ([`full_search`]): exhaustive greedy rounds of
//!    single-subband increments, the accuracy baseline.
//! 2. **Subband removal** ([`subband_removal`]) and **isolated subband
//!    removal** ([`isolated`]): treat subband contributions as independent
//!    and replace the combinatorial search with a sort over probe slopes.
//! 3. **Fixed-order generators** ([`progressive`], [`gains`]): enumerate a
//!    predetermined transmission order and evaluate it point by point.
//!
//! [`direct`] evaluates operator-given allocations without any search.

use crate::alloc::Allocation;
use crate::params::Params;
use crate::report::Reporter;
use crate::tools::Toolchain;
use crate::workspace::Workspace;

pub mod direct;
pub mod full_search;
pub mod gains;
pub mod isolated;
pub mod progressive;
pub mod subband_removal;

/// Strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Independent transmission by subbands, subset-reference distortion.
    Its,
    /// Progressive transmission by subbands.
    Pts,
    /// Progressive transmission by layers.
    Ptl,
    /// Attenuation-modulated PTL, gain-table order.
    AmPtl,
    /// Full-search R/D optimization.
    FullSearch,
    /// Subband-removal R/D optimization.
    SubbandRemoval,
    /// Isolated-subband-removal R/D optimization.
    IsolatedRemoval,
}

impl Algorithm {
    /// Whether the strategy runs once per GOP rather than once over the
    /// whole video.
    pub fn per_gop(self) -> bool {
        matches!(
            self,
            Algorithm::FullSearch | Algorithm::SubbandRemoval | Algorithm::IsolatedRemoval
        )
    }
}

/// Shared collaborator bundle handed to every strategy run.
pub struct RunContext<'a> {
    pub params: &'a Params,
    pub tools: &'a dyn Toolchain,
    pub ws: &'a Workspace,
    pub reporter: &'a Reporter,
}

/// One evaluated probe of the independence heuristics: the allocation that
/// was sent, a mask marking the subband under test, and the resulting slope.
#[derive(Debug, Clone)]
pub(crate) struct Probe {
    pub layers: Allocation,
    pub touched: Allocation,
    pub slope: f64,
}

impl Probe {
    pub fn log_line(&self) -> String {
        format!("[{}] [{}] {:.9}", self.layers, self.touched, self.slope)
    }
}

/// Stable descending sort by slope; insertion order breaks ties.
pub(crate) fn sort_by_slope(probes: &mut [Probe]) {
    probes.sort_by(|a, b| b.slope.partial_cmp(&a.slope).unwrap_or(std::cmp::Ordering::Equal));
}

/// Replays sorted probes as a single monotone transmission schedule.
///
/// Each emitted allocation raises exactly one subband entry relative to the
/// previous one; probes whose value is already subsumed are skipped. The
/// zero head stays at index 0 so callers can drop it before re-evaluating.
pub(crate) fn monotone_schedule(probes: &[Probe], subbands: usize) -> Vec<Allocation> {
    let mut schedule = vec![Allocation::zeros(subbands)];
    for probe in probes {
        let Some(z) = probe.touched.first_nonzero() else {
            continue;
        };
        let current = schedule.last().expect("schedule starts nonempty");
        if current.get(z) < probe.layers.get(z) {
            let mut next = current.clone();
            next.set(z, probe.layers.get(z));
            schedule.push(next);
        }
    }
    schedule
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(layers: Vec<usize>, touched: Vec<usize>, slope: f64) -> Probe {
        Probe {
            layers: Allocation::new(layers),
            touched: Allocation::new(touched),
            slope,
        }
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let mut probes = vec![
            probe(vec![1, 0], vec![1, 0], 0.5),
            probe(vec![0, 1], vec![0, 1], 0.9),
            probe(vec![2, 0], vec![1, 0], 0.5),
        ];
        sort_by_slope(&mut probes);
        assert_eq!(probes[0].slope, 0.9);
        // Equal slopes keep their original relative order.
        assert_eq!(probes[1].layers.entries(), &[1, 0]);
        assert_eq!(probes[2].layers.entries(), &[2, 0]);
    }

    #[test]
    fn schedule_raises_one_entry_per_step() {
        let probes = vec![
            probe(vec![2, 0, 0], vec![1, 0, 0], 0.9),
            probe(vec![0, 1, 0], vec![0, 1, 0], 0.5),
            probe(vec![1, 0, 0], vec![1, 0, 0], 0.4), // subsumed by the first
            probe(vec![3, 0, 0], vec![1, 0, 0], 0.3),
        ];
        let schedule = monotone_schedule(&probes, 3);
        let entries: Vec<_> = schedule.iter().map(|a| a.entries().to_vec()).collect();
        assert_eq!(
            entries,
            vec![vec![0, 0, 0], vec![2, 0, 0], vec![2, 1, 0], vec![3, 1, 0]]
        );
        // Entrywise monotone non-decreasing.
        for pair in schedule.windows(2) {
            for z in 0..3 {
                assert!(pair[0].get(z) <= pair[1].get(z));
            }
        }
    }
}
