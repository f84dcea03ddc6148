use super::{Transport, TransportError};
use crate::config::ClientConfig;
use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

/// One HTTP POST per call.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl Transport for HttpTransport {
    fn round_trip(&self, body: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>, TransportError>> {
        Box::pin(async move {
            let response = self
                .http
                .post(&self.endpoint)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await?;
            trace!(status = %response.status(), "rpc http response");
            Ok(response.bytes().await?.to_vec())
        })
    }
}
