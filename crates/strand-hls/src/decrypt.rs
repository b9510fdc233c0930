//! Streaming segment decryption.

use std::pin::Pin;

use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use strand_drm::{iv_from_sequence, CbcDecryptState, AES_BLOCK_SIZE};
use strand_net::{ByteStream, NetError};

use crate::{
    error::{HlsError, HlsResult},
    playlist::{EncryptionSpec, Segment},
};

/// A plaintext segment byte stream. Dropping it drops whatever transport
/// stream it wraps.
pub type SegmentStream = Pin<Box<dyn Stream<Item = HlsResult<Bytes>> + Send>>;

/// Capability contract: wrap an encrypted byte stream into a plaintext one.
///
/// The returned stream owns `input`; implementations are stateless per
/// call.
pub trait Decryptor: Send + Sync {
    fn decrypt(
        &self,
        input: ByteStream,
        key: [u8; 16],
        spec: &EncryptionSpec,
        segment: &Segment,
    ) -> HlsResult<SegmentStream>;
}

fn transport_error(e: NetError, index: usize) -> HlsError {
    match e {
        NetError::Cancelled => HlsError::Cancelled,
        other => HlsError::SegmentFailed {
            index,
            source: other,
        },
    }
}

/// Adapt a raw transport stream for an unencrypted segment.
pub(crate) fn passthrough(input: ByteStream, index: usize) -> SegmentStream {
    Box::pin(input.map(move |chunk| chunk.map_err(|e| transport_error(e, index))))
}

/// Default AES-128-CBC decryptor with PKCS#7 padding.
///
/// Decrypts incrementally: interior blocks are released as soon as they are
/// block-aligned, and the final block is withheld until end of input so the
/// padding can be stripped. The full ciphertext is never buffered.
#[derive(Debug, Default, Clone, Copy)]
pub struct Aes128CbcDecryptor;

impl Decryptor for Aes128CbcDecryptor {
    fn decrypt(
        &self,
        input: ByteStream,
        key: [u8; 16],
        spec: &EncryptionSpec,
        segment: &Segment,
    ) -> HlsResult<SegmentStream> {
        // Explicit playlist IV wins; otherwise the IV is the big-endian
        // media-sequence number of the segment.
        let iv = spec.iv().unwrap_or_else(|| iv_from_sequence(segment.sequence));
        let index = segment.index;
        let mut state = CbcDecryptState::new(key, iv);

        let stream = try_stream! {
            let mut input = input;
            let mut pending: Vec<u8> = Vec::new();

            while let Some(chunk) = input.next().await {
                let chunk = chunk.map_err(|e| transport_error(e, index))?;
                pending.extend_from_slice(&chunk);

                // Withhold at least one block until EOF; PKCS#7 lives in
                // the last one.
                let ready = pending.len().saturating_sub(AES_BLOCK_SIZE);
                let aligned = ready - ready % AES_BLOCK_SIZE;
                if aligned > 0 {
                    let mut run: Vec<u8> = pending.drain(..aligned).collect();
                    state
                        .decrypt_blocks(&mut run)
                        .map_err(|e| HlsError::DecryptionFailed(e.to_string()))?;
                    yield Bytes::from(run);
                }
            }

            let mut tail = std::mem::take(&mut pending);
            let written = state
                .finish(&mut tail)
                .map_err(|e| HlsError::DecryptionFailed(e.to_string()))?;
            tail.truncate(written);
            yield Bytes::from(tail);
        };

        Ok(Box::pin(stream))
    }
}
