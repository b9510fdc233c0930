use thiserror::Error;

pub type DrmResult<T> = Result<T, DrmError>;

/// Cipher-level failures.
#[derive(Debug, Error)]
pub enum DrmError {
    #[error("ciphertext length {0} is not a multiple of the AES block size")]
    Unaligned(usize),

    #[error("PKCS#7 unpadding failed")]
    Padding,

    #[error("ciphertext is empty")]
    Empty,
}
