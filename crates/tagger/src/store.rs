use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document store transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed document store response: {0}")]
    Malformed(&'static str),
}

/// The document store that holds tagger files, accessed over HTTP.
///
/// Out of scope for this crate's own correctness (it's the pipeline's
/// collaborator), but the tagger owns the shape of the two calls it needs.
#[async_trait]
pub trait DocumentStoreClient: Send + Sync {
    /// `GET /tagger/_search?fields=md5&size=999`, returning `(id, md5)` for
    /// every document currently in the namespace.
    async fn list(&self) -> Result<Vec<(String, String)>, StoreError>;

    /// `GET /tagger/file/{id}/_source`, returning the raw document body.
    async fn fetch(&self, id: &str) -> Result<serde_json::Value, StoreError>;
}

/// A [`DocumentStoreClient`] backed by a plain `reqwest` HTTP client.
pub struct HttpDocumentStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDocumentStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpDocumentStore {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DocumentStoreClient for HttpDocumentStore {
    async fn list(&self) -> Result<Vec<(String, String)>, StoreError> {
        let url = format!("{}/tagger/_search?fields=md5&size=999", self.base_url);
        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let hits = body
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(|h| h.as_array())
            .ok_or(StoreError::Malformed("missing hits.hits array"))?;

        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let id = hit.get("_id").and_then(|v| v.as_str());
            let md5 = hit
                .get("fields")
                .and_then(|f| f.get("md5"))
                .and_then(first_string);
            match (id, md5) {
                (Some(id), Some(md5)) => out.push((id.to_string(), md5)),
                _ => tracing::warn!(?hit, "tagger list hit missing _id or fields.md5, skipping"),
            }
        }
        Ok(out)
    }

    async fn fetch(&self, id: &str) -> Result<serde_json::Value, StoreError> {
        let url = format!("{}/tagger/file/{}/_source", self.base_url, id);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }
}

/// Elasticsearch-style `fields.md5` projections come back as either a bare
/// string or a single-element array; accept both.
fn first_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(arr) => arr.first().and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}
