//! Agent Relay entry point.

use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::Value;

use agent_relay::client::{ClientOptions, ToolRegistry};
use agent_relay::config::{load_providers, resolve_config_path};
use agent_relay::types::{CLIENT_NAME, CLIENT_VERSION, MCP_VERSION};

use agent_relay_server::server::{
    self, timeout_from_secs, ServeOptions, DEFAULT_ADDR, DEFAULT_HEARTBEAT_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};

#[derive(Parser)]
#[command(
    name = "agent-relay",
    about = "Agent Relay: tool providers over stdio, agents and browsers over WebSocket",
    version
)]
struct Cli {
    /// Path to the provider config file.
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect providers and serve the hub over HTTP (default).
    Serve {
        /// Listen address (host:port).
        #[arg(long, default_value = DEFAULT_ADDR)]
        addr: String,

        /// Seconds between peer pings. 0 disables pings.
        #[arg(long, default_value_t = DEFAULT_HEARTBEAT_SECS)]
        heartbeat: u64,

        /// Seconds to wait for a provider reply. 0 waits forever.
        #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
        request_timeout: u64,
    },

    /// Connect providers and print their tool catalogs as JSON.
    Tools {
        /// Only this provider.
        provider: Option<String>,
    },

    /// Call one tool and print the outcome as JSON.
    Call {
        provider: String,
        tool: String,

        /// Tool arguments as a JSON object.
        #[arg(long)]
        args: Option<String>,

        /// Seconds to wait for the reply. 0 waits forever.
        #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
        request_timeout: u64,
    },

    /// Print client identity and configured providers as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   agent-relay completions bash > ~/.local/share/bash-completion/completions/agent-relay
    ///   agent-relay completions zsh > ~/.zfunc/_agent-relay
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve {
        addr: DEFAULT_ADDR.to_string(),
        heartbeat: DEFAULT_HEARTBEAT_SECS,
        request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
    }) {
        Commands::Serve {
            addr,
            heartbeat,
            request_timeout,
        } => {
            server::run(ServeOptions {
                addr,
                config: cli.config,
                heartbeat: Duration::from_secs(heartbeat),
                request_timeout: timeout_from_secs(request_timeout),
            })
            .await?;
        }

        Commands::Tools { provider } => {
            let providers = load_providers(cli.config.as_deref())?;
            let registry = ToolRegistry::default();
            match &provider {
                Some(name) => {
                    let config = providers.providers.get(name).ok_or_else(|| {
                        anyhow::anyhow!("no configuration for provider '{name}'")
                    })?;
                    registry.connect(name, config).await?;
                }
                None => {
                    for (name, e) in registry.connect_all(&providers).await {
                        eprintln!("Failed to connect {name}: {e}");
                    }
                }
            }
            let tools = registry.all_tools();
            registry.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }

        Commands::Call {
            provider,
            tool,
            args,
            request_timeout,
        } => {
            let arguments = args
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .map_err(|e| anyhow::anyhow!("--args is not valid JSON: {e}"))?;

            let providers = load_providers(cli.config.as_deref())?;
            let config = providers
                .providers
                .get(&provider)
                .ok_or_else(|| anyhow::anyhow!("no configuration for provider '{provider}'"))?;

            let registry = ToolRegistry::new(ClientOptions {
                request_timeout: timeout_from_secs(request_timeout),
                ..Default::default()
            });
            registry.connect(&provider, config).await?;
            let outcome = registry.call_tool(&provider, &tool, arguments).await;
            registry.shutdown().await;

            let outcome = outcome?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.success {
                std::process::exit(1);
            }
        }

        Commands::Info => {
            let source = resolve_config_path(cli.config.as_deref());
            let providers = load_providers(cli.config.as_deref())?;
            let info = serde_json::json!({
                "client": {"name": CLIENT_NAME, "version": CLIENT_VERSION},
                "protocol_version": MCP_VERSION,
                "config": source.path().display().to_string(),
                "providers": providers.providers,
                "provider_count": providers.providers.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "agent-relay", &mut std::io::stdout());
        }

        Commands::Repl => {
            let config = cli.config;
            tokio::task::spawn_blocking(move || {
                agent_relay_server::repl::run(config.as_deref(), ClientOptions::default())
            })
            .await??;
        }
    }

    Ok(())
}
