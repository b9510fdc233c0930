#![forbid(unsafe_code)]

//! HLS VOD download engine.
//!
//! One URL in, one contiguous media file out. The processor parses the
//! playlist (following master playlists through a caller-provided variant
//! selector), prefetches AES-128 keys once per unique key spec, pulls
//! segments through a bounded worker pool with retry and cooperative
//! pause/cancel, persists completed indices crash-safely for resume, and
//! finally concatenates the segment files in index order.
//!
//! The four collaborator seams — [`Fetcher`](strand_net::Fetcher),
//! [`Decryptor`], [`ProgressStore`], [`Combiner`] — are capability traits
//! with default implementations; tests and embedders swap them freely.
//!
//! ```no_run
//! use strand_hls::{HlsProcessor, ProcessorOptions};
//!
//! # async fn run() -> strand_hls::HlsResult<()> {
//! let options = ProcessorOptions::new("work", "output.ts").with_num_workers(4);
//! let processor = HlsProcessor::new(options)?;
//! processor
//!     .download(&"https://example.com/media.m3u8".parse().unwrap())
//!     .await
//! # }
//! ```

mod combine;
mod decrypt;
mod error;
mod events;
mod options;
mod parsing;
mod playlist;
mod processor;
mod progress;

pub use combine::{Combiner, ConcatCombiner, FfmpegCombiner};
pub use decrypt::{Aes128CbcDecryptor, Decryptor, SegmentStream};
pub use error::{HlsError, HlsResult};
pub use events::{DownloadState, ProgressCallback, StateCallback};
pub use options::ProcessorOptions;
pub use parsing::{parse_master, parse_media, parse_playlist};
pub use playlist::{
    EncryptionMethod, EncryptionSpec, Playlist, Segment, VariantSelector, VariantStream,
};
pub use processor::{DownloadHandle, HlsProcessor};
pub use progress::{FileProgressStore, ProgressStore, STATE_FILE_NAME};
