use quickrpc::{
    BindError, Client, ClientConfig, Context, Dispatcher, Method, Namespace, Server,
    ServerConfig, Service,
};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::{net::TcpListener, task};
use tracing_subscriber::EnvFilter;

const ADD: Method<(i64, i64), Result<i64, String>> = Method::with_context("Add");
const HELLO: Method<(String,), Result<String, Infallible>> = Method::new("Hello");

pub struct Calc;

impl Calc {
    async fn add(self: Arc<Self>, _ctx: Context, (a, b): (i64, i64)) -> Result<i64, String> {
        a.checked_add(b).ok_or_else(|| format!("{a} + {b} overflows"))
    }

    async fn hello(self: Arc<Self>, _ctx: Context, (name,): (String,)) -> Result<String, Infallible> {
        Ok(format!("Hello, {name}!"))
    }
}

impl Service for Calc {
    fn methods(ns: &mut Namespace<'_, Self>) -> Result<(), BindError> {
        ns.method(&ADD, Calc::add)?.method(&HELLO, Calc::hello)?;
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut dispatcher = Dispatcher::new();
    dispatcher.register("Calc", Arc::new(Calc))?;

    let config = ServerConfig::default();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("http://{}{}", listener.local_addr()?, config.path);
    task::spawn(Server::new(dispatcher, config).serve_on(listener));

    let client = Client::connect(&ClientConfig::new(endpoint, "Calc"))?;
    let hello = client.bind(&HELLO)?;
    let add = client.bind(&ADD)?;

    println!("{}", hello.call(("world".to_string(),)).await?);

    let ctx = Context::with_timeout(Duration::from_secs(1));
    println!("2 + 3 = {}", add.call_in(&ctx, (2, 3)).await?);

    match add.call((i64::MAX, 1)).await {
        Ok(sum) => println!("unexpected sum {sum}"),
        Err(err) => println!("{err}"),
    }
    Ok(())
}
