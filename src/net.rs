pub mod client;
pub mod server;

use crate::{context::Context, dispatcher::Dispatcher};
use futures::future::BoxFuture;
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::warn;

/// Carries one encoded request to the server and brings back the encoded reply.
///
/// One call, one exchange: bodies are fully buffered in both directions. An
/// empty reply means the server sent no frame.
pub trait Transport: Send + Sync + 'static {
    fn round_trip(&self, body: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>, TransportError>>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("transport closed")]
    Closed,
}

/// Serves requests in-process by handing them straight to a [`Dispatcher`].
#[derive(Clone)]
pub struct Loopback {
    dispatcher: Arc<Dispatcher>,
}

impl Loopback {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::shared(Arc::new(dispatcher))
    }

    pub fn shared(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl Transport for Loopback {
    fn round_trip(&self, body: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>, TransportError>> {
        Box::pin(async move {
            let Some(response) = self.dispatcher.handle(Context::background(), &body).await else {
                return Ok(Vec::new());
            };
            response.to_vec().map_err(|err| {
                warn!(error = %err, "rpc response not encodable");
                TransportError::Io(err.into())
            })
        })
    }
}
