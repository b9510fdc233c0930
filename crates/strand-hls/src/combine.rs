//! Segment concatenation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{
    fs::File,
    io::{self, AsyncWriteExt},
};
use tracing::{debug, info};

use crate::error::{HlsError, HlsResult};

/// Capability contract: turn the ordered list of segment files into the
/// final output file. Ordering is by segment index and must be preserved.
#[async_trait]
pub trait Combiner: Send + Sync {
    async fn combine(
        &self,
        segments: &[PathBuf],
        work_dir: &Path,
        output: &Path,
    ) -> HlsResult<()>;
}

/// Default combiner: byte-for-byte concatenation, suitable when segment
/// bodies are MPEG-TS. Each input is deleted once it has been consumed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatCombiner;

#[async_trait]
impl Combiner for ConcatCombiner {
    async fn combine(
        &self,
        segments: &[PathBuf],
        _work_dir: &Path,
        output: &Path,
    ) -> HlsResult<()> {
        let mut out = File::create(output)
            .await
            .map_err(|e| HlsError::io(output, e))?;

        for segment in segments {
            let mut input = File::open(segment)
                .await
                .map_err(|e| HlsError::io(segment, e))?;
            io::copy(&mut input, &mut out)
                .await
                .map_err(|e| HlsError::io(segment, e))?;
            drop(input);
            tokio::fs::remove_file(segment)
                .await
                .map_err(|e| HlsError::io(segment, e))?;
        }

        out.flush().await.map_err(|e| HlsError::io(output, e))?;
        info!(output = %output.display(), segments = segments.len(), "combined segments");
        Ok(())
    }
}

/// Container-aware combiner that shells out to ffmpeg's concat demuxer with
/// stream copy, so the output extension picks the container. Inputs are left
/// in place; the processor's segment cleanup removes them.
#[derive(Debug, Clone)]
pub struct FfmpegCombiner {
    program: String,
}

impl Default for FfmpegCombiner {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
        }
    }
}

impl FfmpegCombiner {
    /// Use a specific ffmpeg binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn concat_list(segments: &[PathBuf]) -> String {
        let mut list = String::from("# ffmpeg concat list\n");
        for segment in segments {
            let escaped = segment.display().to_string().replace('\'', "'\\''");
            list.push_str(&format!("file '{escaped}'\n"));
        }
        list
    }
}

#[async_trait]
impl Combiner for FfmpegCombiner {
    async fn combine(
        &self,
        segments: &[PathBuf],
        work_dir: &Path,
        output: &Path,
    ) -> HlsResult<()> {
        let list_path = work_dir.join("concat_list.txt");
        tokio::fs::write(&list_path, Self::concat_list(segments))
            .await
            .map_err(|e| HlsError::io(&list_path, e))?;

        debug!(program = %self.program, list = %list_path.display(), "invoking external combiner");
        let status = tokio::process::Command::new(&self.program)
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(&list_path)
            .arg("-c")
            .arg("copy")
            .arg("-y")
            .arg(output)
            .status()
            .await;

        // The list file is scratch either way.
        let _ = tokio::fs::remove_file(&list_path).await;

        let status = status.map_err(|e| HlsError::io(&self.program, e))?;
        if !status.success() {
            return Err(HlsError::io(
                output,
                std::io::Error::other(format!("{} exited with {status}", self.program)),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concat_preserves_order_and_deletes_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = (0..3)
            .map(|i| dir.path().join(format!("segment_{}.ts", i + 1)))
            .collect();
        for (i, path) in files.iter().enumerate() {
            tokio::fs::write(path, vec![i as u8; 8]).await.unwrap();
        }

        let output = dir.path().join("out.ts");
        ConcatCombiner
            .combine(&files, dir.path(), &output)
            .await
            .unwrap();

        let combined = tokio::fs::read(&output).await.unwrap();
        let expected: Vec<u8> = (0..3).flat_map(|i| vec![i as u8; 8]).collect();
        assert_eq!(combined, expected);

        for path in &files {
            assert!(!path.exists(), "{} should be deleted", path.display());
        }
    }

    #[tokio::test]
    async fn concat_truncates_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("segment_1.ts");
        tokio::fs::write(&input, b"fresh").await.unwrap();

        let output = dir.path().join("out.ts");
        tokio::fs::write(&output, b"stale stale stale").await.unwrap();

        ConcatCombiner
            .combine(&[input], dir.path(), &output)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn concat_fails_on_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("segment_1.ts");
        let output = dir.path().join("out.ts");

        let err = ConcatCombiner
            .combine(&[missing], dir.path(), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, HlsError::Io { .. }));
    }

    #[test]
    fn concat_list_escapes_single_quotes() {
        let list = FfmpegCombiner::concat_list(&[PathBuf::from("/tmp/it's.ts")]);
        assert!(list.contains("file '/tmp/it'\\''s.ts'"));
    }
}
