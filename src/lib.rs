//! Typed JSON-RPC 2.0 over HTTP without per-method glue.
//!
//! A service contract is a set of [`Method`] descriptors shared by both sides.
//! The server registers a handler per descriptor in a [`Dispatcher`]; the
//! client [`bind`](Client::bind)s each descriptor into a [`Proxy`] that
//! performs one request/response round trip per call.

pub mod client;
pub mod codec;
pub mod config;
pub mod context;
pub mod contract;
pub mod dispatcher;
pub mod net;
pub mod signature;
pub mod types;

pub use client::{CallError, Client, ClientError, Proxy};
pub use codec::RpcError;
pub use config::{ClientConfig, ServerConfig};
pub use context::{Context, Done};
pub use contract::{BindError, Method};
pub use dispatcher::{Dispatcher, MethodInfo, Namespace, Service};
pub use net::{client::HttpTransport, server::Server, Loopback, Transport, TransportError};
pub use signature::{OutputKind, Signature, SignatureError};
pub use types::{Output, ParamError, ParamType, Params};
