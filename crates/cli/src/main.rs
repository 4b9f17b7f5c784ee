use std::{sync::Arc, time::Duration};

use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    palaver_config::GatewayConfig,
    palaver_dispatch::Dispatcher,
    palaver_gateway::{AppState, HttpNluEngine, build_app, default_registry},
    palaver_outbound::{GraphTransport, MessageGateway, Transport},
    palaver_sessions::SessionStore,
};

#[derive(Parser)]
#[command(name = "palaver", about = "Palaver — NLU chat-bot dispatch gateway")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides PALAVER_BIND).
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides PALAVER_PORT).
    #[arg(long)]
    port: Option<u16>,
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = GatewayConfig::from_env()?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    let config = Arc::new(config);

    let store = Arc::new(SessionStore::new());
    let transport = Arc::new(GraphTransport::new(
        config.graph_url.clone(),
        config.page_token.clone(),
    )) as Arc<dyn Transport>;
    let outbound = Arc::new(MessageGateway::new(transport));

    let registry = default_registry(Arc::clone(&store), Arc::clone(&outbound));
    let nlu = Arc::new(HttpNluEngine::new(
        config.nlu_url.clone(),
        config.nlu_token.clone(),
    ));

    let mut dispatcher = Dispatcher::new(Arc::clone(&store), Arc::new(registry), nlu);
    if let Some(max_turns) = config.max_turns {
        dispatcher = dispatcher.with_max_turns(max_turns);
    }
    if let Some(timeout_ms) = config.turn_timeout_ms {
        dispatcher = dispatcher.with_turn_timeout(Duration::from_millis(timeout_ms));
    }

    let state = AppState {
        config: Arc::clone(&config),
        store,
        dispatcher: Arc::new(dispatcher),
        outbound,
    };

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, page_id = %config.page_id, "palaver gateway listening");

    axum::serve(listener, build_app(state)).await?;
    Ok(())
}
