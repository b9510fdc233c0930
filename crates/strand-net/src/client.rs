use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::{ByteStream, Fetcher},
    types::NetOptions,
};

/// Reqwest-backed [`Fetcher`] with connect and read timeouts.
///
/// Cloning is cheap and clones share the connection pool; `fetch` is
/// reentrant, so one client may serve all workers.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// Build a client from options.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Request`] when the underlying TLS/connection
    /// stack cannot be initialized.
    pub fn new(options: NetOptions) -> NetResult<Self> {
        let inner = Client::builder()
            .connect_timeout(options.connect_timeout)
            .read_timeout(options.read_timeout)
            .build()
            .map_err(|e| NetError::Request(format!("failed to build HTTP client: {e:#}")))?;
        Ok(Self { inner, options })
    }

    pub fn options(&self) -> &NetOptions {
        &self.options
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, url: &Url) -> NetResult<ByteStream> {
        debug!(url = %url, "strand-net: GET");
        let resp = self.inner.get(url.clone()).send().await.map_err(NetError::from)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::Status {
                status: status.as_u16(),
                url: url.clone(),
            });
        }

        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(Box::pin(stream))
    }
}
