//! GMS MCP server - main entry point.
//!
//! Serves the built-in microscope tools over MCP on stdio (default) or TCP.

use clap::{Parser, ValueEnum};
use gms_mcp::mcp::{McpRouter, McpServer, ServerInfo};
use gms_mcp::streams::StreamCleanupService;
use gms_mcp::tools::{builtin_registry, ToolContext, ToolDispatcher};
use gms_mcp::types::Transport;
use gms_mcp::Config;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "gms-mcp", version, about = "MCP tool server for electron microscope control")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Transport override
    #[arg(long, value_enum)]
    transport: Option<TransportArg>,

    /// TCP listen address override
    #[arg(long)]
    listen: Option<String>,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    print_config_schema: bool,

    /// Print the tool catalog and exit
    #[arg(long)]
    list_tools: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Stdio,
    Tcp,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Stdio => Transport::Stdio,
            TransportArg::Tcp => Transport::Tcp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.print_config_schema {
        println!("{}", serde_json::to_string_pretty(&Config::json_schema())?);
        return Ok(());
    }

    // Load configuration (defaults, file, environment, then CLI overrides)
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(transport) = cli.transport {
        config.server.transport = transport.into();
    }
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    config.validate()?;

    gms_mcp::observability::init_tracing(&config.observability);

    let registry = Arc::new(builtin_registry()?);
    if cli.list_tools {
        for tool in registry.list() {
            println!("{}", tool.entry.signature());
        }
        return Ok(());
    }

    let context = ToolContext::simulated(&config);
    let mut cleanup = StreamCleanupService::new(context.streams.clone());
    let cleanup_handle = cleanup.start();

    let dispatcher = Arc::new(ToolDispatcher::new(registry, context, &config.dispatch));
    let router = Arc::new(McpRouter::new(
        dispatcher.clone(),
        ServerInfo::new(config.server.name.clone()),
    ));
    let server = McpServer::new(router, config.server.clone());

    tracing::info!(
        transport = ?config.server.transport,
        listen_addr = %config.server.listen_addr,
        tools = dispatcher.registry().len(),
        "gms-mcp starting"
    );

    let serve = server.serve();
    tokio::pin!(serve);
    let result = tokio::select! {
        result = &mut serve => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            server.shutdown();
            serve.await
        }
    };

    cleanup.stop();
    let _ = cleanup_handle.await;

    if let Some(health) = dispatcher.system_health() {
        tracing::info!(
            status = ?health.status,
            healthy = health.summary.healthy,
            degraded = health.summary.degraded,
            unhealthy = health.summary.unhealthy,
            "gms-mcp stopped"
        );
    }

    result?;
    Ok(())
}
