use hearth::config::ServerConfig;
use hearth::handler::{BlockHandler, HandlerFuture};
use hearth::http::fields::status;
use hearth::http::request::Request;
use hearth::http::response::Response;
use hearth::server::Server;
use std::sync::Arc;

fn pong<'a>(_request: &'a mut Request, response: &'a mut Response) -> HandlerFuture<'a> {
    Box::pin(async move { response.send_simple(status::OK, "text/plain", b"pong").await })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = ServerConfig::load();
    let server = Server::new(cfg);

    server.register_handler(Arc::new(BlockHandler::new(
        |request: &Request| request.url().is_some_and(|u| u.path() == "/ping"),
        pong,
    )));

    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.stop().await?;
    Ok(())
}
