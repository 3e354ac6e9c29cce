use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// The wise service's two endpoints. Implemented over HTTP by
/// [`HttpIntelligenceClient`]; swapped for a stub in tests.
#[async_trait]
pub trait IntelligenceClient: Send + Sync {
    /// `GET /fields` — the service's current field schema.
    async fn get_fields(&self) -> Result<Bytes, ClientError>;
    /// `POST /get` — a batch of lookup entries, framed per [`crate::frame`].
    async fn post_get(&self, body: Vec<u8>) -> Result<Bytes, ClientError>;
}

pub struct HttpIntelligenceClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIntelligenceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpIntelligenceClient {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IntelligenceClient for HttpIntelligenceClient {
    async fn get_fields(&self) -> Result<Bytes, ClientError> {
        let resp = self
            .client
            .get(format!("{}/fields", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?)
    }

    async fn post_get(&self, body: Vec<u8>) -> Result<Bytes, ClientError> {
        let resp = self
            .client
            .post(format!("{}/get", self.base_url))
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?)
    }
}
