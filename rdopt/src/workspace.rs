//! Working-directory layout and raw-frame file surgery.
//!
//! One codestream lives in a base directory; truncated files go to
//! `extract/` and reconstructions to `tmp/`. Both scratch directories are
//! flushed and recreated between uses so that no stale file from a previous
//! candidate or GOP can leak into a measurement.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

#[derive(Debug, Clone)]
pub struct Workspace {
    base: PathBuf,
}

impl Workspace {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.base.join("extract")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.base.join("tmp")
    }

    pub fn base_file(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }

    /// Flushes and recreates `extract/` ahead of a candidate extraction.
    pub fn recreate_extract(&self) -> Result<()> {
        recreate_dir(&self.extract_dir())
    }

    /// Flushes `tmp/` and stages every extracted file into it for the
    /// expander.
    pub fn stage_reconstruction(&self) -> Result<()> {
        let tmp = self.tmp_dir();
        recreate_dir(&tmp)?;
        for entry in fs::read_dir(self.extract_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::copy(entry.path(), tmp.join(entry.file_name()))?;
            }
        }
        Ok(())
    }

    /// Copies a frame-aligned byte range of `src` into `dst`.
    ///
    /// `skip` frames are skipped, then `count` frames copied (or everything
    /// to the end of file when `count` is `None`). Short sources simply
    /// yield fewer bytes, matching the underlying block-copy semantics.
    pub fn copy_frames(
        &self,
        src: &Path,
        dst: &Path,
        skip: usize,
        count: Option<usize>,
        frame_bytes: u64,
    ) -> Result<()> {
        let mut input = File::open(src).with_context(|| format!("opening {}", src.display()))?;
        input.seek(SeekFrom::Start(skip as u64 * frame_bytes))?;
        let mut output =
            File::create(dst).with_context(|| format!("creating {}", dst.display()))?;
        match count {
            Some(frames) => {
                let mut taken = input.take(frames as u64 * frame_bytes);
                io::copy(&mut taken, &mut output)?;
            }
            None => {
                io::copy(&mut input, &mut output)?;
            }
        }
        Ok(())
    }

    /// Drops the first `skip` frames of `file` in place.
    pub fn trim_leading_frames(&self, file: &Path, skip: usize, frame_bytes: u64) -> Result<()> {
        let temp = file.with_extension("trim");
        self.copy_frames(file, &temp, skip, None, frame_bytes)?;
        fs::rename(&temp, file)?;
        Ok(())
    }

    /// Moves `name` out of the way under `aside`, returning the new path.
    pub fn set_aside(&self, name: &str, aside: &str) -> Result<PathBuf> {
        let from = self.base.join(name);
        let to = self.base.join(aside);
        fs::rename(&from, &to)
            .with_context(|| format!("setting aside {} as {}", from.display(), to.display()))?;
        Ok(to)
    }

    /// Appends `line` (plus newline) to the file at `path`.
    pub fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("flushing {}", dir.display()))?;
    }
    debug!("recreating {}", dir.display());
    fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_frames_slices_the_requested_range() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let src = dir.path().join("low_0");
        fs::write(&src, [0u8, 0, 1, 1, 2, 2, 3, 3]).unwrap();

        let dst = dir.path().join("low_01");
        ws.copy_frames(&src, &dst, 1, Some(2), 2).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), vec![1, 1, 2, 2]);

        let tail = dir.path().join("tail");
        ws.copy_frames(&src, &tail, 3, None, 2).unwrap();
        assert_eq!(fs::read(&tail).unwrap(), vec![3, 3]);
    }

    #[test]
    fn trim_leading_frames_drops_the_head_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let file = dir.path().join("high_1");
        fs::write(&file, [9u8, 9, 8, 8]).unwrap();
        ws.trim_leading_frames(&file, 1, 2).unwrap();
        assert_eq!(fs::read(&file).unwrap(), vec![8, 8]);
    }

    #[test]
    fn scratch_directories_are_isolated_between_uses() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.recreate_extract().unwrap();
        fs::write(ws.extract_dir().join("stale"), b"x").unwrap();
        ws.recreate_extract().unwrap();
        assert!(!ws.extract_dir().join("stale").exists());

        fs::write(ws.extract_dir().join("kept"), b"y").unwrap();
        ws.stage_reconstruction().unwrap();
        assert!(ws.tmp_dir().join("kept").exists());
    }
}
