//! HTTP transport and attachment resolution.
//!
//! [`Transport`] is the narrow seam between the provider layer and the
//! network: one blocking call, one streaming call. [`HttpTransport`] is
//! the reqwest-backed default; tests can substitute their own.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::types::AttachmentRef;
use crate::Error;

/// Raw network chunks as they arrive, boundaries unspecified.
pub type ByteStream = BoxStream<'static, Result<Bytes, Error>>;

/// Sends converted payloads to a provider endpoint.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// POST the payload and buffer the whole response body.
    async fn send_blocking(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<(u16, String), Error>;

    /// POST the payload and hand back the response byte stream.
    async fn send_streaming(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<(u16, ByteStream), Error>;
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send_blocking(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<(u16, String), Error> {
        let mut request = self
            .client
            .post(url)
            .timeout(Duration::from_secs(120))
            .json(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn send_streaming(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<(u16, ByteStream), Error> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed();
        Ok((status, stream))
    }
}

/// Drain a byte stream into text, for reading error bodies.
pub(crate) async fn collect_body(mut stream: ByteStream) -> String {
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Resolves attachment references to their stored bytes.
///
/// Converters inline attachments into provider payloads (data URLs,
/// base64 source blocks), so they need the raw content at conversion
/// time.
#[async_trait::async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn retrieve(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, Error>;
}

/// Process-local [`AttachmentStore`] keyed by attachment id.
#[derive(Debug, Default)]
pub struct InMemoryAttachmentStore {
    blobs: tokio::sync::RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.write().await.insert(id.into(), bytes);
    }
}

#[async_trait::async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn retrieve(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, Error> {
        self.blobs
            .read()
            .await
            .get(&attachment.id)
            .cloned()
            .ok_or_else(|| Error::attachment(format!("attachment '{}' not found", attachment.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn test_in_memory_store_round_trip() {
        let store = InMemoryAttachmentStore::new();
        store.insert("att-1", vec![1, 2, 3]).await;

        let attachment = AttachmentRef::image("att-1", "photo.png", "image/png");
        assert_eq!(store.retrieve(&attachment).await.unwrap(), vec![1, 2, 3]);

        let missing = AttachmentRef::image("att-2", "other.png", "image/png");
        assert!(store.retrieve(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_collect_body_stops_at_error() {
        let chunks: Vec<Result<Bytes, Error>> = vec![
            Ok(Bytes::from("partial ")),
            Err(Error::decode("boom")),
            Ok(Bytes::from("never")),
        ];
        let body = collect_body(stream::iter(chunks).boxed()).await;
        assert_eq!(body, "partial ");
    }
}
