//! External tool contracts.
//!
//! Truncation, reconstruction and distortion measurement are performed by
//! codec tools outside this crate. [`Toolchain`] is the seam: the engine
//! talks to it with typed calls, the production implementation spawns the
//! tool processes, and tests substitute a scripted mock. A tool that fails
//! does so observably; no zero-byte or made-up result is ever synthesized.

use std::path::Path;
use std::process::Command;

use anyhow::Result;
use log::debug;

use crate::utils::errors::ToolError;

/// One truncation request for a single sub-codestream file.
#[derive(Debug, Clone)]
pub struct TruncateJob<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    /// Quality layers to keep.
    pub layers: usize,
    /// Spatial-resolution levels to discard.
    pub reduce: usize,
    /// Optional bit-rate target. Layer scalability gives better results, so
    /// this is normally absent.
    pub rate_hint: Option<f64>,
}

/// One reconstruction request covering a full set of truncated subbands.
#[derive(Debug, Clone)]
pub struct ExpandJob<'a> {
    /// Directory holding the truncated files; also the working directory.
    pub work_dir: &'a Path,
    pub gops: usize,
    pub trls: usize,
    pub srls: usize,
    pub update_factor: f64,
    /// Block size per texture level above the base, post reduction.
    pub block_sizes: &'a [usize],
    pub block_size_min: usize,
    pub search_range: usize,
    /// Resolution per texture subband, post reduction.
    pub pixels_in_x: &'a [usize],
    pub pixels_in_y: &'a [usize],
    /// Normalized texture reductions, doubling as subpixel accuracy.
    pub subpixel_accuracy: &'a [usize],
}

/// The collaborator contracts of the downstream codec suite.
pub trait Toolchain {
    /// Truncates a sub-codestream and returns its payload size in bytes,
    /// container header excluded.
    fn truncate(&self, job: &TruncateJob) -> Result<u64>;

    /// Rebuilds pixel data from the truncated files in `job.work_dir`.
    fn expand(&self, job: &ExpandJob) -> Result<()>;

    /// Scalar RMSE between a reference and a reconstruction.
    fn measure(&self, reference: &Path, reconstruction: &Path) -> Result<f64>;

    /// Per-frame RMSE report, one line per `frame_bytes`-sized block.
    fn measure_per_frame(
        &self,
        reference: &Path,
        reconstruction: &Path,
        frame_bytes: u64,
    ) -> Result<String>;

    /// Container-header byte length of a codestream file.
    fn header_size(&self, file: &Path) -> Result<u64>;
}

/// Production toolchain backed by the codec suite binaries on `$PATH`.
pub struct ShellToolchain {
    truncator: String,
    expander: Vec<String>,
    meter: String,
    header_probe: String,
}

impl Default for ShellToolchain {
    fn default() -> Self {
        Self {
            truncator: "kdu_transcode".into(),
            expander: vec!["mcj2k".into(), "expand".into()],
            meter: "snr".into(),
            header_probe: "header_size".into(),
        }
    }
}

impl ShellToolchain {
    fn run(&self, tool: &str, cmd: &mut Command) -> Result<std::process::Output> {
        debug!("spawning {cmd:?}");
        let output = cmd.output().map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            source,
        })?;
        Ok(output)
    }

    fn join_csv(values: &[usize]) -> String {
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Toolchain for ShellToolchain {
    fn truncate(&self, job: &TruncateJob) -> Result<u64> {
        let mut cmd = Command::new(&self.truncator);
        cmd.arg("-i")
            .arg(job.input)
            .arg("-o")
            .arg(job.output)
            .arg(format!("Clayers={}", job.layers))
            .arg("-reduce")
            .arg(job.reduce.to_string());
        if let Some(rate) = job.rate_hint.filter(|r| *r > 0.0) {
            cmd.arg("-rate").arg(rate.to_string());
        }

        let output = self.run(&self.truncator, &mut cmd)?;
        if !output.status.success() || !output.stderr.is_empty() {
            // Never leave a half-written file behind to be mistaken for a
            // valid truncation.
            let _ = std::fs::remove_file(job.output);
            return Err(ToolError::Truncate {
                file: job.input.display().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let total = std::fs::metadata(job.output)?.len();
        let header = self.header_size(job.output)?;
        Ok(total.saturating_sub(header))
    }

    fn expand(&self, job: &ExpandJob) -> Result<()> {
        let mut cmd = Command::new(&self.expander[0]);
        cmd.args(&self.expander[1..])
            .current_dir(job.work_dir)
            .arg(format!("--GOPs={}", job.gops))
            .arg(format!("--TRLs={}", job.trls))
            .arg(format!("--SRLs={}", job.srls))
            .arg(format!("--update_factor={}", job.update_factor))
            .arg(format!("--block_size={}", Self::join_csv(job.block_sizes)))
            .arg(format!("--block_size_min={}", job.block_size_min))
            .arg(format!("--search_range={}", job.search_range))
            .arg(format!("--pixels_in_x={}", Self::join_csv(job.pixels_in_x)))
            .arg(format!("--pixels_in_y={}", Self::join_csv(job.pixels_in_y)))
            .arg(format!(
                "--subpixel_accuracy={}",
                Self::join_csv(job.subpixel_accuracy)
            ));

        let output = self.run(&self.expander[0], &mut cmd)?;
        if !output.status.success() {
            return Err(ToolError::Expand {
                dir: job.work_dir.display().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn measure(&self, reference: &Path, reconstruction: &Path) -> Result<f64> {
        let mut cmd = Command::new(&self.meter);
        cmd.arg(format!("--file_A={}", reconstruction.display()))
            .arg(format!("--file_B={}", reference.display()));
        let output = self.run(&self.meter, &mut cmd)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|l| l.contains("RMSE"))
            .ok_or_else(|| ToolError::MeasureEmpty {
                a: reconstruction.display().to_string(),
                b: reference.display().to_string(),
            })?;
        line.split('\t')
            .nth(2)
            .and_then(|field| field.trim().parse::<f64>().ok())
            .ok_or_else(|| {
                ToolError::MeasureParse {
                    a: reconstruction.display().to_string(),
                    b: reference.display().to_string(),
                    line: line.to_string(),
                }
                .into()
            })
    }

    fn measure_per_frame(
        &self,
        reference: &Path,
        reconstruction: &Path,
        frame_bytes: u64,
    ) -> Result<String> {
        let mut cmd = Command::new(&self.meter);
        cmd.arg(format!("--file_A={}", reconstruction.display()))
            .arg(format!("--file_B={}", reference.display()))
            .arg(format!("--block_size={frame_bytes}"));
        let output = self.run(&self.meter, &mut cmd)?;
        // The meter reports the per-frame breakdown on stderr.
        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    }

    fn header_size(&self, file: &Path) -> Result<u64> {
        let mut cmd = Command::new(&self.header_probe);
        cmd.arg(file);
        let output = self.run(&self.header_probe, &mut cmd)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .find_map(|l| l.strip_prefix("OUT"))
            .and_then(|rest| rest.trim().trim_start_matches(':').trim().parse().ok())
            .ok_or_else(|| {
                ToolError::Header {
                    file: file.display().to_string(),
                }
                .into()
            })
    }
}
