//! Resolved run configuration.

use crate::alloc::Reduction;
use crate::geometry::Geometry;
use crate::log_or_err;
use crate::utils::errors::ConfigError;
use anyhow::Result;

/// Stand-in for an unbounded rate budget, in kb/s.
pub const MAX_RATE: f64 = 2_000_000_000.0;

/// Every option the engine consumes, resolved from the command line.
#[derive(Debug, Clone)]
pub struct Params {
    /// Temporal resolution levels.
    pub trls: usize,
    /// Spatial resolution levels of the codestream.
    pub srls: usize,
    /// GOPs to process.
    pub gops: usize,
    /// Frames per second.
    pub fps: f64,
    /// Bit-rate budget in kb/s; [`MAX_RATE`] when unbounded.
    pub brc: f64,
    /// Picture width in pixels.
    pub pixels_in_x: usize,
    /// Picture height in pixels.
    pub pixels_in_y: usize,
    /// Motion-estimation block size.
    pub block_size: usize,
    /// Minimal block size allowed by the expander.
    pub block_size_min: usize,
    /// Motion-estimation search range.
    pub search_range: usize,
    /// Weight of the temporal update step.
    pub update_factor: f64,
    /// Quality layers per texture subband.
    pub texture_layers: usize,
    /// Quality layers per motion field. Motion scalability has not proved
    /// useful, so this stays at 1.
    pub motion_layers: usize,
    /// Spatial reduction levels available to texture subbands.
    pub texture_clevels: usize,
    /// Spatial reduction levels available to motion fields.
    pub motion_clevels: usize,
    /// Requested discarded spatial-resolution levels, one per subband.
    pub discard_srls: Vec<usize>,
    /// Gain-table rows for the gain-ordered generator, when loaded.
    pub gain_table: Option<Vec<Vec<usize>>>,
    /// Diagnostics at this level or above become hard errors.
    pub fail_level: log::Level,
}

impl Params {
    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.trls, self.gops)
    }

    /// Full per-subband layer counts of the codestream.
    pub fn complete_layers(&self) -> Vec<usize> {
        let mut caps = vec![self.texture_layers; self.trls];
        caps.extend(vec![self.motion_layers; self.trls - 1]);
        caps
    }

    /// Layer cap of the subband at allocation index `z`.
    pub fn layer_cap(&self, z: usize) -> usize {
        if z < self.trls {
            self.texture_layers
        } else {
            self.motion_layers
        }
    }

    /// Validates the discarded-resolution list against the subband count.
    ///
    /// A length mismatch is recoverable: the list is replaced with all
    /// zeros. Under strict mode the mismatch is a hard error instead.
    pub fn resolve_discards(&mut self) -> Result<Reduction> {
        let expected = self.geometry().subbands();
        if self.discard_srls.len() != expected {
            log_or_err!(
                self,
                log::Level::Warn,
                ConfigError::DiscardListLength {
                    expected,
                    got: self.discard_srls.len(),
                    trls: self.trls,
                },
            );
            log::warn!("substituting all-zero discarded-resolution list");
            self.discard_srls = vec![0; expected];
        }
        Ok(Reduction::new(self.discard_srls.clone()))
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            trls: 4,
            srls: 5,
            gops: 1,
            fps: 30.0,
            brc: MAX_RATE,
            pixels_in_x: 352,
            pixels_in_y: 288,
            block_size: 32,
            block_size_min: 32,
            search_range: 4,
            update_factor: 1.0 / 4.0,
            texture_layers: 16,
            motion_layers: 1,
            texture_clevels: 0,
            motion_clevels: 0,
            discard_srls: vec![0; 7],
            gain_table: None,
            fail_level: log::Level::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_discard_list_is_zeroed() {
        let mut params = Params {
            trls: 3,
            discard_srls: vec![1, 2],
            ..Params::default()
        };
        let reduces = params.resolve_discards().unwrap();
        assert_eq!(reduces.entries(), &[0, 0, 0, 0, 0]);
        assert_eq!(params.discard_srls, vec![0; 5]);
    }

    #[test]
    fn mismatched_discard_list_fails_in_strict_mode() {
        let mut params = Params {
            trls: 3,
            discard_srls: vec![1, 2],
            fail_level: log::Level::Warn,
            ..Params::default()
        };
        assert!(params.resolve_discards().is_err());
    }

    #[test]
    fn matching_discard_list_is_kept() {
        let mut params = Params {
            trls: 3,
            discard_srls: vec![1, 0, 0, 1, 0],
            ..Params::default()
        };
        let reduces = params.resolve_discards().unwrap();
        assert_eq!(reduces.entries(), &[1, 0, 0, 1, 0]);
    }

    #[test]
    fn complete_layers_cover_textures_then_motion() {
        let params = Params {
            trls: 3,
            texture_layers: 8,
            ..Params::default()
        };
        assert_eq!(params.complete_layers(), vec![8, 8, 8, 1, 1]);
    }
}
