//! promql-trigger binary - polls registered PromQL queries and invokes function webhooks.

#![deny(missing_docs)]

use conf::Conf;
use promql_trigger::{Registrar, TriggerConfig, init_logging};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod listen_http;
use listen_http::start_http_task;

/// Top-level configuration for promql-trigger.
#[derive(Conf, Debug)]
pub struct Config {
    /// If true, just validate config and don't start
    #[conf(long)]
    dry_run: bool,
    /// Socket to listen for HTTP requests (GET /health, POST conversion requests)
    #[conf(long, env, default_value = "0.0.0.0:8080")]
    http_listen_addr: SocketAddr,
    /// Port assigned by the platform. Overrides the port of http_listen_addr.
    #[conf(long, env)]
    port: Option<u16>,
    #[conf(flatten)]
    trigger: TriggerConfig,
}

impl Config {
    fn listen_addr(&self) -> SocketAddr {
        let mut addr = self.http_listen_addr;
        if let Some(port) = self.port {
            addr.set_port(port);
        }
        addr
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::parse();
    // Not the whole config, since it holds the platform token
    info!(
        "Config: log-cache at {}, {} queries every {:?}, delivery mode {}",
        config.trigger.vcap_application.log_cache_addr(),
        config.trigger.queries.as_ref().map_or(0, |q| q.queries.len()),
        config.trigger.interval,
        config.trigger.delivery_mode(),
    );

    if config.dry_run {
        return Ok(());
    }

    let token = CancellationToken::new();

    // One connection pool for log-cache, the platform API and webhooks
    let http = reqwest::Client::builder().build()?;
    let platform = config.trigger.platform_client(http.clone());
    let saver = Arc::new(config.trigger.state_saver(platform.clone()));
    let registrar = Arc::new(Registrar::new(saver));
    let scheduler = config.trigger.scheduler(http, platform);

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(listen_addr).await?;
    info!("Listening for http on {listen_addr}");

    // Listen for ctrl-c
    let thread_token = token.clone();
    tokio::task::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for ctrl-c: {err}");
            return;
        }
        warn!("ctrl-c: Stop requested");
        thread_token.cancel();
    });

    let _http_task = start_http_task(listener, registrar);

    // Blocks until the token is canceled
    scheduler.run_every(config.trigger.interval, token).await;

    Ok(())
}
