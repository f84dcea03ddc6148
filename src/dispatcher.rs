use crate::{
    codec::{self, Request, Response, RpcError, INTERNAL_ERROR},
    context::Context,
    contract::{BindError, Method},
    signature::Signature,
    types::{Output, ParamError, Params, Reply},
};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::value::RawValue;
use std::{collections::BTreeMap, future::Future, marker::PhantomData, sync::Arc};
use tracing::{debug, trace, warn};

/// A service whose operations can be registered under a namespace.
///
/// ```
/// use quickrpc::{BindError, Context, Dispatcher, Method, Namespace, Service};
/// use std::sync::Arc;
///
/// const ADD: Method<(i64, i64), Result<i64, String>> = Method::with_context("Add");
///
/// struct Calc;
///
/// impl Calc {
///     async fn add(self: Arc<Self>, _ctx: Context, (a, b): (i64, i64)) -> Result<i64, String> {
///         a.checked_add(b).ok_or_else(|| "overflow".to_string())
///     }
/// }
///
/// impl Service for Calc {
///     fn methods(ns: &mut Namespace<'_, Self>) -> Result<(), BindError> {
///         ns.method(&ADD, Calc::add)?;
///         Ok(())
///     }
/// }
///
/// let mut dispatcher = Dispatcher::new();
/// dispatcher.register("Calc", Arc::new(Calc)).unwrap();
/// assert_eq!(dispatcher.methods()[0].name, "Calc.Add");
/// ```
pub trait Service: Send + Sync + Sized + 'static {
    fn methods(ns: &mut Namespace<'_, Self>) -> Result<(), BindError>;
}

/// Maps `"<namespace>.<operation>"` to a typed handler.
///
/// The table is filled through [`register`](Self::register) or
/// [`namespace`](Self::namespace) and only read afterwards. Requests are served
/// with [`handle`](Self::handle) or [`dispatch`](Self::dispatch).
#[derive(Default)]
pub struct Dispatcher {
    methods: BTreeMap<String, Arc<dyn DynamicMethod>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every operation `service` declares in [`Service::methods`].
    pub fn register<S: Service>(
        &mut self,
        namespace: &str,
        service: Arc<S>,
    ) -> Result<(), BindError> {
        S::methods(&mut self.namespace(namespace, service))
    }

    /// Opens a namespace for registering handlers one at a time.
    pub fn namespace<S>(&mut self, namespace: &str, receiver: Arc<S>) -> Namespace<'_, S>
    where
        S: Send + Sync + 'static,
    {
        Namespace {
            dispatcher: self,
            name: namespace.to_owned(),
            receiver,
        }
    }

    pub fn methods(&self) -> Vec<MethodInfo> {
        self.methods
            .iter()
            .map(|(name, method)| MethodInfo {
                name: name.clone(),
                signature: method.signature().clone(),
            })
            .collect()
    }

    /// Decodes `body` and dispatches it.
    ///
    /// Returns `None` when no frame must be sent: for notifications and for
    /// bodies so broken that no `id` could be read.
    pub async fn handle(&self, ctx: Context, body: &[u8]) -> Option<Response> {
        match codec::decode_request(body) {
            Ok(request) => self.dispatch(ctx, request).await,
            Err(failure) => {
                debug!(id = ?failure.id, error = %failure.source, "rpc parse error");
                let id = failure.id?;
                Some(Response::failure(id, RpcError::parse(failure.source)))
            }
        }
    }

    pub async fn dispatch(&self, ctx: Context, request: Request) -> Option<Response> {
        let Request {
            id, method, params, ..
        } = request;
        trace!(%method, ?id, "rpc request");

        let Some(handler) = self.methods.get(&method) else {
            debug!(%method, "rpc method not found");
            return id.map(|id| Response::failure(id, RpcError::method_not_found(&method)));
        };

        let expected = handler.signature().params.len();
        if params.len() != expected {
            debug!(%method, expected, got = params.len(), "rpc param count mismatch");
            return id.map(|id| {
                Response::failure(id, RpcError::invalid_params(expected, params.len()))
            });
        }

        let call = match handler.call(ctx, &params) {
            Ok(call) => call,
            Err(err) => {
                debug!(%method, error = %err, "rpc param decode failed");
                return id.map(|id| Response::failure(id, RpcError::parse(err)));
            }
        };
        let outcome = call.await;

        let Some(id) = id else {
            match outcome {
                Ok(Outcome {
                    error: Some(message),
                    ..
                }) => warn!(%method, %message, "rpc notification handler failed"),
                Err(err) => warn!(%method, error = %err, "rpc notification result not encodable"),
                Ok(_) => {}
            }
            return None;
        };

        Some(match outcome {
            Ok(Outcome { result, error }) => Response {
                error: error.map(RpcError::application),
                ..Response::success(id, result)
            },
            Err(err) => {
                warn!(%method, id, error = %err, "rpc result not encodable");
                Response::failure(
                    id,
                    RpcError::new(INTERNAL_ERROR, format!("encoding result: {err}")),
                )
            }
        })
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub signature: Signature,
}

/// Registers handlers for one namespace, all bound to the same receiver.
pub struct Namespace<'a, S> {
    dispatcher: &'a mut Dispatcher,
    name: String,
    receiver: Arc<S>,
}

impl<'a, S> Namespace<'a, S>
where
    S: Send + Sync + 'static,
{
    /// Binds `handler` to `method`.
    ///
    /// The handler always gets a [`Context`]; for methods declared without one
    /// it is a background context. Registering the same name twice fails.
    pub fn method<P, O, F, Fut>(
        &mut self,
        method: &Method<P, O>,
        handler: F,
    ) -> Result<&mut Self, BindError>
    where
        P: Params,
        O: Output,
        F: Fn(Arc<S>, Context, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        let (name, signature) = method.bind(&self.name)?;
        if self.dispatcher.methods.contains_key(&name) {
            return Err(BindError::Duplicate(name));
        }
        debug!(method = %name, ?signature, "rpc method registered");
        let typed = TypedMethod {
            receiver: Arc::clone(&self.receiver),
            handler,
            signature,
            _marker: PhantomData,
        };
        self.dispatcher.methods.insert(name, Arc::new(typed));
        Ok(self)
    }
}

/// A finished call, with the result already encoded.
struct Outcome {
    result: Option<Box<RawValue>>,
    error: Option<String>,
}

type CallFuture = BoxFuture<'static, Result<Outcome, serde_json::Error>>;

struct TypedMethod<S, P, O, F> {
    receiver: Arc<S>,
    handler: F,
    signature: Signature,
    _marker: PhantomData<fn(P) -> O>,
}

/// A type-erased [`TypedMethod`]
trait DynamicMethod: Send + Sync {
    fn signature(&self) -> &Signature;
    fn call(&self, ctx: Context, params: &[Box<RawValue>]) -> Result<CallFuture, ParamError>;
}

impl<S, P, O, F, Fut> DynamicMethod for TypedMethod<S, P, O, F>
where
    S: Send + Sync + 'static,
    P: Params,
    O: Output,
    F: Fn(Arc<S>, Context, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, ctx: Context, params: &[Box<RawValue>]) -> Result<CallFuture, ParamError> {
        let params = P::decode(params)?;
        let ctx = if self.signature.has_context {
            ctx
        } else {
            Context::background()
        };
        let fut = (self.handler)(Arc::clone(&self.receiver), ctx, params);
        let kind = self.signature.output;

        Ok(Box::pin(async move {
            let Reply { value, error } = fut.await.into_reply();
            let result = match value {
                Some(value) if kind.has_value() => {
                    Some(serde_json::value::to_raw_value(&value)?)
                }
                _ => None,
            };
            Ok(Outcome {
                result,
                error: error.filter(|_| kind.has_error()),
            })
        }))
    }
}
