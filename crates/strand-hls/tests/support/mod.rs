//! Shared fixtures for processor integration tests: a scripted in-memory
//! fetcher, AES-128-CBC encryption helpers and notification recorders.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use aes::Aes128;
use async_trait::async_trait;
use bytes::Bytes;
use cbc::{
    cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit},
    Encryptor,
};
use futures::stream;
use strand_hls::{DownloadState, ProgressCallback, StateCallback};
use strand_net::{ByteStream, Fetcher, NetError, NetResult};
use url::Url;

/// One scripted answer for a URL.
#[derive(Clone)]
pub enum StubResponse {
    /// Serve these bytes, chunked.
    Body(Vec<u8>),
    /// Fail with a transient connection reset.
    Transient,
    /// Fail with a terminal 404.
    NotFound,
}

/// In-memory [`Fetcher`] with per-URL scripts and call counting.
///
/// Scripted responses are consumed in order; the last one repeats for any
/// further calls.
#[derive(Default)]
pub struct StubFetcher {
    scripts: Mutex<HashMap<String, VecDeque<StubResponse>>>,
    counts: Mutex<HashMap<String, usize>>,
}

impl StubFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Always serve `body` for `url`.
    pub fn on(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.on_script(url, vec![StubResponse::Body(body.into())]);
    }

    /// Serve the scripted responses in order for `url`.
    pub fn on_script(&self, url: &str, responses: Vec<StubResponse>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
    }

    /// How many times `url` was fetched.
    pub fn calls(&self, url: &str) -> usize {
        self.counts.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &Url) -> NetResult<ByteStream> {
        let key = url.to_string();
        *self.counts.lock().unwrap().entry(key.clone()).or_insert(0) += 1;

        let response = {
            let mut scripts = self.scripts.lock().unwrap();
            let queue = scripts
                .get_mut(&key)
                .unwrap_or_else(|| panic!("no stub response for {key}"));
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().expect("empty stub script")
            }
        };

        match response {
            StubResponse::Body(body) => {
                let chunks: Vec<NetResult<Bytes>> = body
                    .chunks(64)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Ok(Box::pin(stream::iter(chunks)))
            }
            StubResponse::Transient => {
                Err(NetError::Connection("connection reset by peer".into()))
            }
            StubResponse::NotFound => Err(NetError::Status {
                status: 404,
                url: url.clone(),
            }),
        }
    }
}

/// AES-128-CBC encrypt with PKCS#7 padding (mirror of the engine's
/// decryption path).
pub fn encrypt_aes128_cbc(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    let padded = plaintext.len() + (16 - plaintext.len() % 16);
    let mut buf = vec![0u8; padded];
    buf[..plaintext.len()].copy_from_slice(plaintext);
    Encryptor::<Aes128>::new(key.into(), iv.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .expect("aes128 encrypt")
        .to_vec()
}

/// 1024-byte segment body: byte `j` is `index + j (mod 256)`.
pub fn segment_plaintext(index: usize) -> Vec<u8> {
    (0..1024).map(|j| ((index + j) % 256) as u8).collect()
}

pub type StateLog = Arc<Mutex<Vec<(DownloadState, String)>>>;

/// State callback that records every notification.
pub fn state_recorder() -> (StateCallback, StateLog) {
    let log: StateLog = Arc::new(Mutex::new(Vec::new()));
    let callback: StateCallback = {
        let log = log.clone();
        Arc::new(move |state, message: &str| {
            log.lock().unwrap().push((state, message.to_string()));
        })
    };
    (callback, log)
}

pub type ProgressLog = Arc<Mutex<Vec<(usize, usize)>>>;

/// Progress callback that records every `(done, total)` pair.
pub fn progress_recorder() -> (ProgressCallback, ProgressLog) {
    let log: ProgressLog = Arc::new(Mutex::new(Vec::new()));
    let callback: ProgressCallback = {
        let log = log.clone();
        Arc::new(move |done, total| {
            log.lock().unwrap().push((done, total));
        })
    };
    (callback, log)
}

/// The recorded state sequence, without messages.
pub fn states_of(log: &StateLog) -> Vec<DownloadState> {
    log.lock().unwrap().iter().map(|(s, _)| *s).collect()
}

/// Opt-in test logging via `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
