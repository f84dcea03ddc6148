use crate::{codec, config::ServerConfig, context::Context, dispatcher::Dispatcher};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    body::Incoming,
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use std::{convert::Infallible, io, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, task};
use tracing::{debug, info, warn};

/// Serves a [`Dispatcher`] over HTTP/1, one request body per call.
pub struct Server {
    dispatcher: Dispatcher,
    config: ServerConfig,
}

impl Server {
    pub fn new(dispatcher: Dispatcher, config: ServerConfig) -> Self {
        Self { dispatcher, config }
    }

    pub async fn serve(self) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.listen).await?;
        self.serve_on(listener).await
    }

    /// Accepts connections from `listener` until accepting fails.
    pub async fn serve_on(self, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, path = %self.config.path, "rpc server listening");
        let root_arc = Arc::new(self);
        loop {
            let (sock, peer) = listener.accept().await?;
            let arc_self = Arc::clone(&root_arc);
            task::spawn(async move {
                let service = service_fn(move |req| {
                    let server = Arc::clone(&arc_self);
                    async move { Ok::<_, Infallible>(server.respond(req, peer).await) }
                });
                if let Err(err) = http1::Builder::new()
                    .serve_connection(TokioIo::new(sock), service)
                    .await
                {
                    debug!(%peer, error = %err, "rpc connection closed with error");
                }
            });
        }
    }

    async fn respond(&self, req: Request<Incoming>, peer: SocketAddr) -> Response<Full<Bytes>> {
        if req.uri().path() != self.config.path {
            return status(StatusCode::NOT_FOUND);
        }
        if req.method() != hyper::Method::POST {
            return status(StatusCode::METHOD_NOT_ALLOWED);
        }

        // Cancelled when the exchange completes or hyper drops it on disconnect.
        let ctx = Context::background();
        let _guard = ctx.cancel_on_drop();

        let body = match Limited::new(req.into_body(), self.config.max_body_bytes)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                debug!(%peer, "rpc request body too large");
                return status(StatusCode::PAYLOAD_TOO_LARGE);
            }
            Err(err) => {
                debug!(%peer, error = %err, "rpc request body unreadable");
                return status(StatusCode::BAD_REQUEST);
            }
        };

        let Some(frame) = self.dispatcher.handle(ctx.clone(), &body).await else {
            return status(StatusCode::NO_CONTENT);
        };
        let code = if frame.error.as_ref().is_some_and(codec::RpcError::is_reserved) {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };
        match frame.to_vec() {
            Ok(bytes) => {
                let mut resp = Response::new(Full::new(Bytes::from(bytes)));
                *resp.status_mut() = code;
                resp.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                resp
            }
            Err(err) => {
                warn!(%peer, id = frame.id, error = %err, "rpc response not encodable");
                status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn status(code: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = code;
    resp
}
