use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use url::Url;

use crate::error::NetResult;

/// A readable byte stream backed by some connection. Dropping the stream
/// releases the connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = NetResult<Bytes>> + Send>>;

/// Capability contract: resolve a URL to a readable byte stream.
///
/// Implementations must be callable concurrently and must classify faults
/// via [`NetError::is_retryable`](crate::NetError::is_retryable) so callers
/// can tell transient faults from terminal ones.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> NetResult<ByteStream>;

    /// Fetch and read the whole body into memory. Suitable for small
    /// resources (playlists, keys); segments should stream.
    async fn fetch_bytes(&self, url: &Url) -> NetResult<Bytes> {
        let mut stream = self.fetch(url).await?;
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(out))
    }
}
