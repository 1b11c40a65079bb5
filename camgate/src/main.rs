mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use camgate_api::AppState;
use camgate_core::{logging, Config};

#[derive(Parser, Debug)]
#[command(name = "camgate")]
#[command(about = "Camera gateway: PTZ control and media server proxy", long_about = None)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, env = "CAMGATE_CONFIG_PATH")]
    config: Option<String>,

    /// HTTP listen host (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// HTTP listen port (overrides configuration)
    #[arg(long)]
    port: Option<u16>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;

    if let Some(host) = &args.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = load_config(&args)?;

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("camgate starting...");
    info!("HTTP address: {}", config.http_address());
    info!(
        "Stream mode: {}, HLS origin: {}, WHEP origin: {}",
        config.media.mode.as_str(),
        config.media.hls_origin,
        config.media.whep_origin
    );
    info!(
        "PTZ transport: {}, cameras: {}",
        config.ptz.transport.as_str(),
        config.ptz.cameras.len()
    );

    // 4. Build services
    let state = AppState::from_config(config)?;

    // 5. Serve until shutdown
    server::run(state).await
}
