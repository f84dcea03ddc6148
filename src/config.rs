use serde::Deserialize;
use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

pub const DEFAULT_PATH: &str = "/rpc/v0";
pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// The only path requests are accepted on.
    pub path: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            path: DEFAULT_PATH.to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Full URL of the server endpoint, path included.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub namespace: String,
    /// Upper bound for a whole HTTP exchange, on top of any call context.
    #[serde(default)]
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: namespace.into(),
            request_timeout: None,
        }
    }
}

fn default_endpoint() -> String {
    format!("http://{}:{DEFAULT_PORT}{DEFAULT_PATH}", Ipv4Addr::LOCALHOST)
}
