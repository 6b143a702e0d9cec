//! Push notification gateway.
//!
//! Registers push subscriptions, fans one notification out to every
//! subscriber, and guards the write side with an origin gate and a shared
//! sliding-window rate limiter.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ origin gate ──▶ rate limiter ──▶ handlers
//!                     (request id,     (Origin/        (memory or        │
//!                      trace,           Referer,         Redis counters)  │
//!                      timeout)         JSON)                             │
//!                                                                         ▼
//!                          ┌──────────────────────────┬───────────────────────────┐
//!                          │ subscription registry    │ push dispatcher           │
//!                          │ (memory / remote store)  │ (fan-out, web-push, prune)│
//!                          └────────────┬─────────────┴─────────────┬─────────────┘
//!                                       ▼                           ▼
//!                              remote data service           push services
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;

use push_gateway::config::{self, GatewayConfig};
use push_gateway::lifecycle::{self, signals, Shutdown};
use push_gateway::observability::{logging, metrics};
use push_gateway::push::vapid::generate_keys;
use push_gateway::GatewayServer;

#[derive(Parser, Debug)]
#[command(name = "push-gateway", version, about = "Push notification gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway (default)
    Serve,
    /// Print a fresh VAPID key pair as environment lines
    Keygen {
        #[arg(long)]
        subject: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// TOML configuration file; defaults are used when omitted
    #[arg(long, short, env = "PUSH_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "PUSH_GATEWAY_VAPID_PRIVATE_KEY", hide_env_values = true)]
    vapid_private_key: Option<String>,
    #[arg(long, env = "PUSH_GATEWAY_VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "PUSH_GATEWAY_VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    #[arg(long, env = "PUSH_GATEWAY_SEND_SECRET", hide_env_values = true)]
    send_secret: Option<String>,
    #[arg(long, env = "PUSH_GATEWAY_SESSION_SECRET", hide_env_values = true)]
    session_secret: Option<String>,
    #[arg(long, env = "PUSH_GATEWAY_REDIS_URL", hide_env_values = true)]
    redis_url: Option<String>,
    #[arg(long, env = "PUSH_GATEWAY_REMOTE_BASE_URL")]
    remote_base_url: Option<String>,
    #[arg(long, env = "PUSH_GATEWAY_REMOTE_API_KEY", hide_env_values = true)]
    remote_api_key: Option<String>,
}

impl ServeArgs {
    fn apply(self, config: &mut GatewayConfig) {
        fn set(target: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *target = value;
            }
        }
        set(&mut config.push.vapid_private_key, self.vapid_private_key);
        set(&mut config.push.vapid_public_key, self.vapid_public_key);
        set(&mut config.push.vapid_subject, self.vapid_subject);
        set(&mut config.push.send_secret, self.send_secret);
        set(&mut config.session.secret, self.session_secret);
        set(&mut config.rate_limit.redis_url, self.redis_url);
        set(&mut config.remote.base_url, self.remote_base_url);
        set(&mut config.remote.api_key, self.remote_api_key);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Keygen { subject }) => keygen(subject),
        Some(Command::Serve) | None => serve(cli.serve).await,
    }
}

fn keygen(subject: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    for line in generate_keys()?.env_lines(subject.as_deref()) {
        println!("{line}");
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => GatewayConfig::default(),
    };
    args.apply(&mut config);
    if let Err(errors) = config::validation::validate_config(&config) {
        return Err(config::ConfigError::Validation(errors).into());
    }

    logging::init_logging(&config.observability);
    tracing::info!("push-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Arc::new(Shutdown::new());
    let state = lifecycle::build_state(config, &shutdown).await?;
    signals::spawn_signal_listener(shutdown.clone());

    let server = GatewayServer::new(state);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
