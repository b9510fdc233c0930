use aes::Aes128;
use cbc::{
    cipher::{
        block_padding::{NoPadding, Pkcs7},
        BlockDecryptMut, KeyIvInit,
    },
    Decryptor,
};

use crate::error::{DrmError, DrmResult};

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// Incremental AES-128-CBC decryption for one segment.
///
/// CBC chains each block on the previous *ciphertext* block, so interior
/// chunks can be decrypted as they arrive: [`decrypt_blocks`] processes a
/// block-aligned run and rolls the IV to the run's last ciphertext block,
/// [`finish`] decrypts the withheld final run and strips PKCS#7 padding.
/// Callers must hold back at least one block until end of input.
///
/// [`decrypt_blocks`]: CbcDecryptState::decrypt_blocks
/// [`finish`]: CbcDecryptState::finish
pub struct CbcDecryptState {
    key: [u8; AES_BLOCK_SIZE],
    iv: [u8; AES_BLOCK_SIZE],
}

impl CbcDecryptState {
    pub fn new(key: [u8; AES_BLOCK_SIZE], iv: [u8; AES_BLOCK_SIZE]) -> Self {
        Self { key, iv }
    }

    /// Decrypt a block-aligned interior run in place.
    ///
    /// # Errors
    ///
    /// [`DrmError::Unaligned`] when `buf` is not a multiple of the block
    /// size.
    pub fn decrypt_blocks(&mut self, buf: &mut [u8]) -> DrmResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if buf.len() % AES_BLOCK_SIZE != 0 {
            return Err(DrmError::Unaligned(buf.len()));
        }

        // The next IV is this run's last ciphertext block; capture it
        // before decrypting in place.
        let mut next_iv = [0u8; AES_BLOCK_SIZE];
        next_iv.copy_from_slice(&buf[buf.len() - AES_BLOCK_SIZE..]);

        Decryptor::<Aes128>::new((&self.key).into(), (&self.iv).into())
            .decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| DrmError::Padding)?;

        self.iv = next_iv;
        Ok(())
    }

    /// Decrypt the final run in place and strip PKCS#7 padding, returning
    /// the plaintext length.
    ///
    /// # Errors
    ///
    /// [`DrmError::Empty`] on empty input, [`DrmError::Unaligned`] on a
    /// partial block, [`DrmError::Padding`] when the padding bytes are
    /// malformed (wrong key, corrupt ciphertext).
    pub fn finish(self, buf: &mut [u8]) -> DrmResult<usize> {
        if buf.is_empty() {
            return Err(DrmError::Empty);
        }
        if buf.len() % AES_BLOCK_SIZE != 0 {
            return Err(DrmError::Unaligned(buf.len()));
        }

        let plaintext = Decryptor::<Aes128>::new((&self.key).into(), (&self.iv).into())
            .decrypt_padded_mut::<Pkcs7>(buf)
            .map_err(|_| DrmError::Padding)?;
        Ok(plaintext.len())
    }
}
