//! Playlist value types.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
    time::Duration,
};

use url::Url;

/// HLS encryption methods as they appear in `#EXT-X-KEY`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EncryptionMethod {
    /// Whole-segment AES-128-CBC.
    Aes128,
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aes128 => f.write_str("AES-128"),
        }
    }
}

/// How a contiguous run of segments is encrypted.
///
/// Identity is the `(method, key_url, iv)` tuple; the key cell is a cache,
/// populated at most once before any segment using the spec is fetched, and
/// never part of equality. Adjacent segments under one `#EXT-X-KEY` tag
/// share a single `Arc<EncryptionSpec>`, which keeps key prefetch at one
/// fetch per unique spec.
#[derive(Debug)]
pub struct EncryptionSpec {
    method: EncryptionMethod,
    key_url: Url,
    iv: Option<[u8; 16]>,
    key: OnceLock<[u8; 16]>,
}

impl EncryptionSpec {
    pub fn new(method: EncryptionMethod, key_url: Url, iv: Option<[u8; 16]>) -> Self {
        Self {
            method,
            key_url,
            iv,
            key: OnceLock::new(),
        }
    }

    pub fn method(&self) -> &EncryptionMethod {
        &self.method
    }

    pub fn key_url(&self) -> &Url {
        &self.key_url
    }

    /// The explicit IV from the playlist, if any.
    pub fn iv(&self) -> Option<[u8; 16]> {
        self.iv
    }

    /// The cached key bytes, if already fetched.
    pub fn key(&self) -> Option<[u8; 16]> {
        self.key.get().copied()
    }

    /// Populate the key cache. The first write wins; later writes of the
    /// same fetched value are no-ops.
    pub fn set_key(&self, key: [u8; 16]) {
        let _ = self.key.set(key);
    }
}

impl PartialEq for EncryptionSpec {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method && self.key_url == other.key_url && self.iv == other.iv
    }
}

impl Eq for EncryptionSpec {}

impl Hash for EncryptionSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.method.hash(state);
        self.key_url.as_str().hash(state);
        self.iv.hash(state);
    }
}

/// One media segment. Created during parse, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Position in the playlist, `0..N`.
    pub index: usize,
    /// Media-sequence-adjusted index (`media_sequence + index`); feeds IV
    /// derivation for specs without an explicit IV.
    pub sequence: u64,
    /// Absolute URL, resolved against the playlist URL.
    pub url: Url,
    pub duration: Duration,
    pub title: Option<String>,
    pub encryption: Option<Arc<EncryptionSpec>>,
}

/// A parsed media playlist.
#[derive(Debug, Clone)]
pub struct Playlist {
    /// Segments in playlist order, unique by index.
    pub segments: Vec<Segment>,
    pub target_duration: Option<Duration>,
    /// Media sequence number of the first segment.
    pub media_sequence: u64,
    /// Whether `#EXT-X-ENDLIST` was present.
    pub end_list: bool,
}

/// One variant entry from a master playlist, as handed to the selector.
#[derive(Debug, Clone)]
pub struct VariantStream {
    /// Absolute media playlist URL.
    pub url: Url,
    pub bandwidth: Option<u64>,
    pub resolution: Option<String>,
    pub codecs: Option<String>,
}

/// Picks a variant from a master playlist; `None` declines them all.
pub type VariantSelector = Arc<dyn Fn(&[VariantStream]) -> Option<usize> + Send + Sync>;
