use crate::{
    codec::{Request, Response, RpcError},
    config::ClientConfig,
    context::{Context, Done},
    contract::{BindError, Method},
    net::{client::HttpTransport, Transport, TransportError},
    signature::Signature,
    types::{Output, ParamError, Params},
};
use serde::Deserialize;
use std::{
    marker::PhantomData,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tracing::{debug, trace};

/// The calling side of a namespace.
///
/// Owns the transport and the request id counter. Cloning is cheap and clones
/// share both, so ids stay unique across every [`Proxy`] bound from it.
pub struct Client<T = HttpTransport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    transport: T,
    namespace: String,
    next_id: AtomicI64,
}

impl Client<HttpTransport> {
    pub fn connect(config: &ClientConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(transport, config.namespace.clone()))
    }
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, namespace: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                namespace: namespace.into(),
                next_id: AtomicI64::new(0),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Builds the callable stand-in for one operation.
    pub fn bind<P, O>(&self, method: &Method<P, O>) -> Result<Proxy<P, O, T>, BindError>
    where
        P: Params,
        O: Output,
    {
        let (name, signature) = method.bind(&self.inner.namespace)?;
        debug!(method = %name, ?signature, "rpc proxy bound");
        Ok(Proxy {
            client: self.clone(),
            method: name.into(),
            signature: Arc::new(signature),
            _marker: PhantomData,
        })
    }

    fn next_id(&self) -> i64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn round_trip(&self, ctx: &Context, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        if let Some(done) = ctx.err() {
            return Err(done.into());
        }
        tokio::select! {
            done = ctx.done() => Err(done.into()),
            reply = self.inner.transport.round_trip(body) => Ok(reply?),
        }
    }
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A bound operation. Each call is one request/response round trip.
pub struct Proxy<P, O, T = HttpTransport> {
    client: Client<T>,
    method: Arc<str>,
    signature: Arc<Signature>,
    _marker: PhantomData<fn(P) -> O>,
}

impl<P, O, T> Proxy<P, O, T>
where
    P: Params,
    O: Output,
    T: Transport,
{
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub async fn call(&self, params: P) -> Result<O::Value, CallError> {
        self.call_in(&Context::background(), params).await
    }

    /// Calls the operation, giving up waiting once `ctx` is done.
    ///
    /// Giving up only stops the local wait; a request already sent keeps
    /// running on the server.
    pub async fn call_in(&self, ctx: &Context, params: P) -> Result<O::Value, CallError> {
        let id = self.client.next_id();
        let body = self.encode(Some(id), &params)?;
        trace!(method = %self.method, id, "rpc call");

        let raw = self.client.round_trip(ctx, body).await?;
        let response: Response<O::Value> =
            serde_json::from_slice(&raw).map_err(ClientError::Decode)?;
        if response.id != id {
            return Err(ClientError::IdMismatch {
                sent: id,
                received: response.id,
            }
            .into());
        }
        if let Some(err) = response.error {
            return Err(CallError::Remote(err));
        }
        match response.result {
            Some(value) => Ok(value),
            None => O::Value::deserialize(serde_json::Value::Null)
                .map_err(|err| ClientError::MissingResult(err).into()),
        }
    }

    /// Sends the operation as a notification. Nothing is read back.
    pub async fn notify(&self, params: P) -> Result<(), ClientError> {
        let body = self.encode(None, &params)?;
        trace!(method = %self.method, "rpc notification");
        self.client
            .round_trip(&Context::background(), body)
            .await
            .map(drop)
    }

    fn encode(&self, id: Option<i64>, params: &P) -> Result<Vec<u8>, ClientError> {
        let request = Request::new(id, &*self.method, params.encode()?);
        serde_json::to_vec(&request).map_err(ClientError::Encode)
    }
}

impl<P, O, T> Clone for Proxy<P, O, T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            method: Arc::clone(&self.method),
            signature: Arc::clone(&self.signature),
            _marker: PhantomData,
        }
    }
}

/// Failure before a valid response frame was obtained.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("encoding params: {0}")]
    Params(#[from] ParamError),

    #[error("encoding request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Context(#[from] Done),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("decoding response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("response carries no result: {0}")]
    MissingResult(#[source] serde_json::Error),

    #[error("request and response id didn't match (sent {sent}, received {received})")]
    IdMismatch { sent: i64, received: i64 },
}

/// What a proxy call returns instead of a value.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("RPC client error: {0}")]
    Client(#[from] ClientError),

    #[error(transparent)]
    Remote(RpcError),
}

impl CallError {
    pub fn remote(&self) -> Option<&RpcError> {
        match self {
            Self::Remote(err) => Some(err),
            Self::Client(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatcher::{Dispatcher, Namespace, Service},
        net::Loopback,
    };
    use futures::future::BoxFuture;
    use std::{collections::HashMap, convert::Infallible, sync::atomic::AtomicUsize, time::Duration};

    const ADD: Method<(i64, i64), Result<i64, String>> = Method::with_context("Add");
    const NAP: Method<(u64,), ()> = Method::with_context("Nap");
    const UNIT: Method<(), Result<(), String>> = Method::new("Unit");

    struct Calc;

    impl Calc {
        async fn add(self: Arc<Self>, _ctx: Context, (a, b): (i64, i64)) -> Result<i64, String> {
            Ok(a + b)
        }

        async fn nap(self: Arc<Self>, _ctx: Context, (ms,): (u64,)) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        async fn unit(self: Arc<Self>, _ctx: Context, (): ()) -> Result<(), String> {
            Ok(())
        }
    }

    impl Service for Calc {
        fn methods(ns: &mut Namespace<'_, Self>) -> Result<(), BindError> {
            ns.method(&ADD, Calc::add)?
                .method(&NAP, Calc::nap)?
                .method(&UNIT, Calc::unit)?;
            Ok(())
        }
    }

    fn client() -> Client<Loopback> {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("Calc", Arc::new(Calc)).unwrap();
        Client::new(Loopback::new(dispatcher), "Calc")
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn round_trip(&self, _body: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>, TransportError>> {
            Box::pin(async { Err(TransportError::Closed) })
        }
    }

    #[derive(Default)]
    struct Counting {
        sends: AtomicUsize,
    }

    impl Transport for Arc<Counting> {
        fn round_trip(&self, _body: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>, TransportError>> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(TransportError::Closed) })
        }
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let client = client();
        let other = client.clone();
        assert_eq!(client.next_id(), 1);
        assert_eq!(other.next_id(), 2);
        assert_eq!(self::client().next_id(), 1);
    }

    #[tokio::test]
    async fn call_round_trip() {
        let add = client().bind(&ADD).unwrap();
        assert_eq!(add.method(), "Calc.Add");
        assert_eq!(add.call((2, 3)).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn error_only_output_decodes_unit() {
        let unit = client().bind(&UNIT).unwrap();
        unit.call(()).await.unwrap();
    }

    #[tokio::test]
    async fn transport_failure_is_client_error() {
        let client = Client::new(Unreachable, "Calc");
        let err = client.bind(&ADD).unwrap().call((1, 1)).await.unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::Transport(TransportError::Closed))
        ));
        assert!(err.to_string().starts_with("RPC client error: "));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_waiting() {
        let nap = client().bind(&NAP).unwrap();
        let ctx = Context::with_timeout(Duration::from_millis(10));
        let err = nap.call_in(&ctx, (60_000,)).await.unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::Context(Done::DeadlineExceeded))
        ));
    }

    #[tokio::test]
    async fn cancelled_context_fails_before_sending() {
        let client = Client::new(Unreachable, "Calc");
        let ctx = Context::background();
        ctx.cancel();
        let err = client.bind(&ADD).unwrap().call_in(&ctx, (1, 2)).await.unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::Context(Done::Cancelled))
        ));
    }

    #[tokio::test]
    async fn unencodable_param_fails_before_sending() {
        const TALLY: Method<(String, HashMap<(i32, i32), i32>), Result<i64, String>> =
            Method::new("Tally");

        let counting = Arc::new(Counting::default());
        let client = Client::new(Arc::clone(&counting), "Calc");
        let tally = client.bind(&TALLY).unwrap();

        let grid = HashMap::from([((0, 0), 1)]);
        let err = tally.call(("grid".into(), grid)).await.unwrap_err();
        assert!(
            matches!(
                err,
                CallError::Client(ClientError::Params(ParamError::Codec { index: 1, .. }))
            ),
            "{err}"
        );
        assert_eq!(counting.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_value_is_an_error() {
        const NUMBER: Method<(), Result<u32, Infallible>> = Method::new("Unit");
        let number = client().bind(&NUMBER).unwrap();
        let err = number.call(()).await.unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::MissingResult(_))
        ));
    }
}
