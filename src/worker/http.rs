use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use super::{SegmentPayload, Worker};
use crate::error::WorkerError;
use crate::reduce::PartialResult;

/// Calls the `/map` endpoint of a `wordshard serve` process
pub struct HttpWorker {
    id: String,
    endpoint: Url,
    client: reqwest::Client,
    shared_fs: bool,
}

impl HttpWorker {
    /// `base` is the server root, e.g. `http://10.0.0.5:7878` or
    /// `http://gateway/wordshard` behind a path prefix.
    pub fn new(base: &Url, timeout: Option<Duration>) -> Result<Self, WorkerError> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("map")
            .map_err(|e| WorkerError::Http(format!("invalid worker url {base}: {e}")))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            id: base.to_string(),
            endpoint,
            client: builder.build()?,
            shared_fs: false,
        })
    }

    /// Declare that the server sees the driver's input at the same path.
    pub fn with_shared_filesystem(mut self, shared_fs: bool) -> Self {
        self.shared_fs = shared_fs;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Worker for HttpWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn shares_filesystem(&self) -> bool {
        self.shared_fs
    }

    async fn invoke(&self, payload: SegmentPayload) -> Result<PartialResult, WorkerError> {
        tracing::debug!("POST {} for {}", self.endpoint, payload.segment);

        let response = self.client.post(self.endpoint.clone()).json(&payload).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(WorkerError::Http(format!("{status}: {}", body.trim())));
        }

        let partial: PartialResult = serde_json::from_str(&body)?;
        Ok(partial)
    }
}
