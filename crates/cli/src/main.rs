use clap::{Parser, Subcommand};
use relay::resolver::Resolver;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "inbox-relay")]
#[command(about = "Relay channel messages into a support inbox", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the gateway (HTTP endpoints for the bot layer).
    Gateway {
        /// Config file path (default: INBOX_RELAY_CONFIG_PATH or ~/.inbox-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Verify the inbox service is reachable and the access token is accepted.
    Check {
        /// Config file path (default: INBOX_RELAY_CONFIG_PATH or ~/.inbox-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the normalized identifier for a raw phone number.
    Normalize {
        /// Raw phone number, e.g. "55 1234 5678"
        phone: String,
    },

    /// Relay one inbound message, creating contact and conversation if needed.
    Send {
        /// Config file path (default: INBOX_RELAY_CONFIG_PATH or ~/.inbox-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Display name for a new contact.
        #[arg(long, short)]
        name: Option<String>,

        phone: String,
        message: String,
    },

    /// Relay one bot reply into the number's existing conversation.
    Reply {
        /// Config file path (default: INBOX_RELAY_CONFIG_PATH or ~/.inbox-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        phone: String,
        response: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("inbox-relay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Gateway { config, port }) => run_gateway(config, port).await,
        Some(Commands::Check { config }) => run_check(config).await,
        Some(Commands::Normalize { phone }) => {
            println!("{}", relay::phone::normalize(&phone));
            Ok(())
        }
        Some(Commands::Send {
            config,
            name,
            phone,
            message,
        }) => run_send(config, name, phone, message).await,
        Some(Commands::Reply {
            config,
            phone,
            response,
        }) => run_reply(config, phone, response).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn load_resolver(config_path: Option<PathBuf>) -> anyhow::Result<Resolver> {
    let (config, _) = relay::config::load_config(config_path)?;
    Ok(Resolver::from_config(&config))
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, _) = relay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    relay::gateway::run_gateway(config).await
}

async fn run_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let resolver = load_resolver(config_path)?;
    if !resolver.test_connection().await {
        anyhow::bail!("inbox connection check failed");
    }
    println!("inbox connection ok");
    Ok(())
}

async fn run_send(
    config_path: Option<PathBuf>,
    name: Option<String>,
    phone: String,
    message: String,
) -> anyhow::Result<()> {
    let resolver = load_resolver(config_path)?;
    let delivery = resolver
        .try_process_incoming_message(&phone, &message, name.as_deref())
        .await?;
    println!(
        "posted message {} to conversation {} ({})",
        delivery.message_id, delivery.conversation_id, delivery.identifier
    );
    Ok(())
}

async fn run_reply(
    config_path: Option<PathBuf>,
    phone: String,
    response: String,
) -> anyhow::Result<()> {
    let resolver = load_resolver(config_path)?;
    let delivery = resolver.try_process_bot_response(&phone, &response).await?;
    println!(
        "posted reply {} to conversation {} ({})",
        delivery.message_id, delivery.conversation_id, delivery.identifier
    );
    Ok(())
}
