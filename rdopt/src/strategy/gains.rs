//! Attenuation-modulated progressive transmission (AmPTL).
//!
//! The transmission order is a fixed table derived from the energy
//! attenuation of each temporal subband: coarser bands are granted layers
//! more often than finer ones, roughly in proportion to their measured
//! gains. The table is data, not logic: it can be loaded from configuration
//! for any temporal depth, and the published five-level table ships built
//! in.

use anyhow::Result;

use crate::alloc::{Allocation, Candidate, Reduction};
use crate::evaluate::{MeasurePair, SearchRun};
use crate::params::Params;
use crate::scope::Scope;
use crate::utils::errors::ConfigError;

use super::RunContext;

/// Published transmission order for five temporal levels, 16 texture
/// layers. Derived from the subband gains
/// `[1.0878, 2.1250, 3.8885, 5.8022] ~ [1, 2, 4, 6]`, re-weighted as the
/// coarser bands saturate.
const GAIN_SCHEDULE_T5: &[[usize; 9]] = &[
    [0, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 0, 0, 0, 0, 1, 0, 0, 0],
    [1, 1, 0, 0, 0, 1, 0, 0, 0],
    [2, 1, 0, 0, 0, 1, 0, 0, 0],
    [2, 2, 0, 0, 0, 1, 0, 0, 0],
    [2, 2, 0, 0, 0, 1, 1, 0, 0],
    [2, 2, 1, 0, 0, 1, 1, 0, 0],
    [3, 2, 1, 0, 0, 1, 1, 0, 0],
    [3, 3, 1, 0, 0, 1, 1, 0, 0],
    [4, 3, 1, 0, 0, 1, 1, 0, 0],
    [4, 4, 1, 0, 0, 1, 1, 0, 0],
    [4, 4, 2, 0, 0, 1, 1, 0, 0],
    [4, 4, 2, 0, 0, 1, 1, 1, 0],
    [4, 4, 2, 1, 0, 1, 1, 1, 0],
    [5, 4, 2, 1, 0, 1, 1, 1, 0],
    [5, 5, 2, 1, 0, 1, 1, 1, 0],
    [6, 5, 2, 1, 0, 1, 1, 1, 0],
    [6, 6, 2, 1, 0, 1, 1, 1, 0],
    [6, 6, 3, 1, 0, 1, 1, 1, 0],
    [6, 6, 3, 1, 0, 1, 1, 1, 1],
    [6, 6, 3, 1, 1, 1, 1, 1, 1],
    [7, 6, 3, 1, 1, 1, 1, 1, 1],
    [7, 7, 3, 1, 1, 1, 1, 1, 1],
    [8, 7, 3, 1, 1, 1, 1, 1, 1],
    [8, 8, 3, 1, 1, 1, 1, 1, 1],
    [8, 8, 4, 1, 1, 1, 1, 1, 1],
    [8, 8, 4, 2, 1, 1, 1, 1, 1],
    [9, 8, 4, 2, 1, 1, 1, 1, 1],
    [9, 9, 4, 2, 1, 1, 1, 1, 1],
    [10, 9, 4, 2, 1, 1, 1, 1, 1],
    [10, 10, 4, 2, 1, 1, 1, 1, 1],
    [10, 10, 5, 2, 1, 1, 1, 1, 1],
    [11, 10, 5, 2, 1, 1, 1, 1, 1],
    [11, 11, 5, 2, 1, 1, 1, 1, 1],
    [12, 11, 5, 2, 1, 1, 1, 1, 1],
    [12, 12, 5, 2, 1, 1, 1, 1, 1],
    [12, 12, 6, 2, 1, 1, 1, 1, 1],
    [12, 12, 6, 3, 1, 1, 1, 1, 1],
    [12, 12, 6, 3, 2, 1, 1, 1, 1],
    [13, 12, 6, 3, 2, 1, 1, 1, 1],
    [13, 13, 6, 3, 2, 1, 1, 1, 1],
    [14, 13, 6, 3, 2, 1, 1, 1, 1],
    [14, 14, 6, 3, 2, 1, 1, 1, 1],
    [14, 14, 7, 3, 2, 1, 1, 1, 1],
    [15, 14, 7, 3, 2, 1, 1, 1, 1],
    [15, 15, 7, 3, 2, 1, 1, 1, 1],
    [16, 15, 7, 3, 2, 1, 1, 1, 1],
    [16, 16, 7, 3, 2, 1, 1, 1, 1],
    [16, 16, 8, 3, 2, 1, 1, 1, 1],
    [16, 16, 8, 4, 2, 1, 1, 1, 1],
    [16, 16, 9, 4, 2, 1, 1, 1, 1],
    [16, 16, 9, 4, 3, 1, 1, 1, 1],
    [16, 16, 10, 4, 3, 1, 1, 1, 1],
    [16, 16, 10, 5, 3, 1, 1, 1, 1],
    [16, 16, 11, 5, 3, 1, 1, 1, 1],
    [16, 16, 12, 5, 3, 1, 1, 1, 1],
    [16, 16, 12, 6, 3, 1, 1, 1, 1],
    [16, 16, 12, 6, 4, 1, 1, 1, 1],
    [16, 16, 13, 6, 4, 1, 1, 1, 1],
    [16, 16, 14, 6, 4, 1, 1, 1, 1],
    [16, 16, 14, 7, 4, 1, 1, 1, 1],
    [16, 16, 15, 7, 4, 1, 1, 1, 1],
    [16, 16, 15, 7, 5, 1, 1, 1, 1],
    [16, 16, 16, 7, 5, 1, 1, 1, 1],
    [16, 16, 16, 8, 5, 1, 1, 1, 1],
    [16, 16, 16, 8, 6, 1, 1, 1, 1],
    [16, 16, 16, 8, 7, 1, 1, 1, 1],
    [16, 16, 16, 8, 8, 1, 1, 1, 1],
    [16, 16, 16, 9, 8, 1, 1, 1, 1],
    [16, 16, 16, 9, 9, 1, 1, 1, 1],
    [16, 16, 16, 10, 9, 1, 1, 1, 1],
    [16, 16, 16, 10, 10, 1, 1, 1, 1],
    [16, 16, 16, 11, 10, 1, 1, 1, 1],
    [16, 16, 16, 11, 11, 1, 1, 1, 1],
    [16, 16, 16, 12, 11, 1, 1, 1, 1],
    [16, 16, 16, 12, 12, 1, 1, 1, 1],
    [16, 16, 16, 13, 12, 1, 1, 1, 1],
    [16, 16, 16, 13, 13, 1, 1, 1, 1],
    [16, 16, 16, 14, 13, 1, 1, 1, 1],
    [16, 16, 16, 14, 14, 1, 1, 1, 1],
    [16, 16, 16, 15, 14, 1, 1, 1, 1],
    [16, 16, 16, 15, 15, 1, 1, 1, 1],
    [16, 16, 16, 16, 15, 1, 1, 1, 1],
    [16, 16, 16, 16, 16, 1, 1, 1, 1],
];

/// The transmission schedule for the configured temporal depth.
///
/// A table loaded from configuration wins; otherwise the built-in
/// five-level table applies, and any other depth without a table is a
/// configuration error.
pub fn schedule(params: &Params) -> Result<Vec<Allocation>> {
    let width = params.geometry().subbands();
    if let Some(table) = &params.gain_table {
        return table
            .iter()
            .enumerate()
            .map(|(row, entries)| {
                if entries.len() != width {
                    Err(ConfigError::GainTableWidth {
                        row,
                        got: entries.len(),
                        expected: width,
                    }
                    .into())
                } else {
                    Ok(Allocation::new(entries.clone()))
                }
            })
            .collect();
    }
    if params.trls == 5 {
        return Ok(GAIN_SCHEDULE_T5
            .iter()
            .map(|row| Allocation::new(row.to_vec()))
            .collect());
    }
    Err(ConfigError::GainTableMissing(params.trls).into())
}

/// Evaluates the gain-ordered schedule over the whole video.
pub fn run_amptl(ctx: &RunContext<'_>) -> Result<()> {
    let params = ctx.params;
    let geo = params.geometry();
    let span = geo.span_whole();
    let discards = Reduction::new(params.discard_srls.clone());
    let mut run = SearchRun::new(
        params,
        ctx.tools,
        ctx.ws,
        ctx.reporter,
        Scope::Whole,
        discards.clone(),
    );
    let refs = MeasurePair::new("low_0", "low_0");

    for send in schedule(params)? {
        let eval = run.evaluate(&Candidate::new(send.clone(), discards.clone()), &span, &refs)?;
        ctx.reporter.gnuplot(&format!(
            "{:.3}\t {:.6}\t [{}]",
            eval.kbps.average, eval.rmse, send
        ))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_matches_five_levels() {
        let params = Params {
            trls: 5,
            discard_srls: vec![0; 9],
            ..Params::default()
        };
        let schedule = schedule(&params).unwrap();
        assert_eq!(schedule[0].entries(), &[0; 9]);
        assert_eq!(schedule.last().unwrap().entries(), &[16, 16, 16, 16, 16, 1, 1, 1, 1]);
        // Entrywise monotone: a gain table never takes a layer back.
        for pair in schedule.windows(2) {
            for z in 0..9 {
                assert!(pair[0].get(z) <= pair[1].get(z));
            }
        }
    }

    #[test]
    fn other_depths_need_a_loaded_table() {
        let params = Params {
            trls: 3,
            discard_srls: vec![0; 5],
            ..Params::default()
        };
        assert!(schedule(&params).is_err());

        let params = Params {
            gain_table: Some(vec![vec![0; 5], vec![1, 0, 0, 0, 0]]),
            ..params
        };
        let rows = schedule(&params).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn loaded_table_rows_must_match_the_subband_count() {
        let params = Params {
            trls: 3,
            discard_srls: vec![0; 5],
            gain_table: Some(vec![vec![0; 4]]),
            ..Params::default()
        };
        assert!(schedule(&params).is_err());
    }
}
