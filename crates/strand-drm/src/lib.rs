#![forbid(unsafe_code)]

//! AES-128-CBC primitives for HLS segment decryption.
//!
//! [`CbcDecryptState`] decrypts a segment incrementally: interior blocks go
//! through [`CbcDecryptState::decrypt_blocks`] (which chains the IV forward),
//! the final block through [`CbcDecryptState::finish`] (which removes PKCS#7
//! padding). [`iv_from_sequence`] derives the per-segment IV when a playlist
//! does not carry an explicit one.

mod decrypt;
mod error;
mod iv;

pub use decrypt::{CbcDecryptState, AES_BLOCK_SIZE};
pub use error::{DrmError, DrmResult};
pub use iv::iv_from_sequence;
