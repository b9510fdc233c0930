//! Processor configuration.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use strand_net::NetOptions;

use crate::playlist::VariantSelector;

/// Configuration for [`HlsProcessor`](crate::HlsProcessor).
#[derive(Clone)]
pub struct ProcessorOptions {
    /// Scratch directory for segment files and the progress state.
    pub work_dir: PathBuf,
    /// Final combined output file.
    pub output_path: PathBuf,
    /// Concurrent segment workers, at least 1.
    pub num_workers: usize,
    /// Delete leftover segment files after a successful combine.
    pub cleanup_segments: bool,
    /// Fail playlist parsing on unrecognized tags and duration violations.
    pub strict_parse: bool,
    /// Picks a variant when the URL resolves to a master playlist.
    pub variant_selector: Option<VariantSelector>,
    /// Network configuration (timeouts, retry policy).
    pub net: NetOptions,
    /// How long outstanding workers get to wind down at shutdown before
    /// they are abandoned.
    pub shutdown_grace: Duration,
}

impl ProcessorOptions {
    pub fn new(work_dir: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            output_path: output_path.into(),
            num_workers: 1,
            cleanup_segments: true,
            strict_parse: false,
            variant_selector: None,
            net: NetOptions::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    pub fn with_cleanup_segments(mut self, cleanup: bool) -> Self {
        self.cleanup_segments = cleanup;
        self
    }

    pub fn with_strict_parse(mut self, strict: bool) -> Self {
        self.strict_parse = strict;
        self
    }

    pub fn with_variant_selector(mut self, selector: VariantSelector) -> Self {
        self.variant_selector = Some(selector);
        self
    }

    pub fn with_net(mut self, net: NetOptions) -> Self {
        self.net = net;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Segment file path for an index: `{work_dir}/segment_{index+1}.ts`.
    #[must_use]
    pub fn segment_path(&self, index: usize) -> PathBuf {
        segment_path(&self.work_dir, index)
    }
}

pub(crate) fn segment_path(work_dir: &Path, index: usize) -> PathBuf {
    work_dir.join(format!("segment_{}.ts", index + 1))
}

impl fmt::Debug for ProcessorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorOptions")
            .field("work_dir", &self.work_dir)
            .field("output_path", &self.output_path)
            .field("num_workers", &self.num_workers)
            .field("cleanup_segments", &self.cleanup_segments)
            .field("strict_parse", &self.strict_parse)
            .field(
                "variant_selector",
                &self.variant_selector.as_ref().map(|_| "VariantSelector"),
            )
            .field("net", &self.net)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}
