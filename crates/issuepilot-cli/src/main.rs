use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use issuepilot_config::{load_config, ConfigLoader};
use issuepilot_mcp::McpClient;
use issuepilot_server::run_server;

#[derive(Parser)]
#[command(name = "issuepilot")]
#[command(about = "GitHub issue research assistant", long_about = None)]
struct Cli {
    /// Explicit config file, in addition to the discovered ones.
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the HTTP service")]
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value = "0.0.0.0")]
        hostname: String,
    },
    #[command(about = "Launch the tool provider once and print its catalog")]
    CheckTools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = {
        let mut loader = ConfigLoader::new();
        let mut base = load_config(std::env::current_dir()?)?;
        if let Some(path) = &cli.config {
            loader.load_from_file(path)?;
            base.merge(loader.build());
        }
        base
    };

    match cli.command {
        Some(Commands::Serve { port, hostname }) => serve(config, hostname, port).await,
        Some(Commands::CheckTools) => check_tools(config).await,
        None => serve(config, "0.0.0.0".to_string(), 8080).await,
    }
}

async fn serve(config: issuepilot_config::Config, hostname: String, port: u16) -> anyhow::Result<()> {
    let hostname = config
        .server
        .as_ref()
        .and_then(|s| s.hostname.clone())
        .unwrap_or(hostname);
    let port = config.server.as_ref().and_then(|s| s.port).unwrap_or(port);

    let addr: SocketAddr = format!("{hostname}:{port}").parse()?;
    tracing::info!(%addr, model = %config.openai.model, "starting issuepilot");
    run_server(addr, config).await
}

async fn check_tools(config: issuepilot_config::Config) -> anyhow::Result<()> {
    let client = McpClient::new().with_timeout(config.mcp.timeout_ms);
    match client
        .initialize(&config.mcp, config.github.token.as_deref())
        .await
    {
        Ok(tools) => {
            println!("{} tools available:", tools.len());
            for tool in tools {
                println!(
                    "  {}  {}",
                    tool.name,
                    tool.description.as_deref().unwrap_or("")
                );
            }
        }
        Err(e) => {
            eprintln!("tool provider unavailable: {e}");
        }
    }
    client.close().await.ok();
    Ok(())
}
