use std::path::PathBuf;

use {
    ackbridge_config::BridgeConfig,
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "ackbridge", about = "ackbridge: HTTP routes answered by WebSocket peers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (toml, yaml or json). Discovered when omitted.
    #[arg(long, global = true, env = "ACKBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        #[arg(long, env = "ACKBRIDGE_BIND")]
        bind: Option<String>,
        #[arg(long, env = "ACKBRIDGE_PORT")]
        port: Option<u16>,
        /// Admit this client ID (repeatable). Replaces the configured list.
        #[arg(long = "allow", value_name = "CLIENT_ID")]
        allow: Vec<String>,
        /// Broadcast `server-time` at this interval; 0 disables.
        #[arg(long, value_name = "MS")]
        server_time_ms: Option<u64>,
    },
    /// Connect a peer that answers `login` requests.
    Peer {
        #[arg(long, env = "ACKBRIDGE_URL")]
        url: Option<String>,
        #[arg(long, env = "ACKBRIDGE_CLIENT_ID")]
        client_id: Option<String>,
    },
    /// Print the effective configuration.
    Config,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "ackbridge starting");

    let mut config: BridgeConfig = ackbridge_config::load_or_discover(cli.config.as_deref())
        .context("failed to load config")?;

    match cli.command {
        Commands::Gateway {
            bind,
            port,
            allow,
            server_time_ms,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if !allow.is_empty() {
                config.auth.allowed_client_ids = allow;
            }
            if let Some(ms) = server_time_ms {
                config.realtime.server_time_interval_ms = ms;
            }
            ackbridge_gateway::server::start_gateway(config).await
        },
        Commands::Peer { url, client_id } => {
            if let Some(url) = url {
                config.peer.url = url;
            }
            if let Some(client_id) = client_id {
                config.peer.client_id = client_id;
            }
            ackbridge_peer::run_peer(&config.peer)
                .await
                .context("peer stopped")
        },
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config).context("serialize config")?;
            println!("{rendered}");
            Ok(())
        },
    }
}
