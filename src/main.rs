use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use teamchat_gateway::channels::ZoomChannel;
use teamchat_gateway::validation::DirectSendPayload;
use teamchat_gateway::{ApiServerBuilder, Config};

/// Team Chat - Zoom Team Chat chatbot gateway for Anthropic models
#[derive(Parser)]
#[command(name = "teamchat", version, about)]
struct Cli {
    /// Port to listen on (overrides PORT)
    #[arg(long, env = "TEAMCHAT_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook and API server (default)
    Serve,
    /// Validate configuration and print a summary
    CheckConfig {
        /// Also exchange Zoom credentials for a token
        #[arg(long)]
        probe: bool,
    },
    /// Send a chatbot message directly
    Send {
        /// Recipient user or channel JID
        #[arg(long)]
        to: String,
        /// Message ID to thread the reply under
        #[arg(long)]
        reply_to: Option<String>,
        /// Message text
        message: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,teamchat_gateway=info",
        1 => "info,teamchat_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::CheckConfig { probe } => check_config(&config, probe).await,
        Command::Send {
            to,
            reply_to,
            message,
        } => send(&config, to, message, reply_to).await,
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        port = config.api_server.port,
        model = %config.anthropic.model,
        bot_jid = %config.zoom.bot_jid,
        stream = config.relay.stream,
        "starting team chat gateway"
    );

    let server = ApiServerBuilder::from_config(config)?.build();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

async fn check_config(config: &Config, probe: bool) -> anyhow::Result<()> {
    println!("Configuration OK");
    println!("  bot JID:        {}", config.zoom.bot_jid);
    println!("  Zoom API:       {}", config.zoom.api_base_url);
    println!("  model:          {}", config.anthropic.model);
    println!("  port:           {}", config.api_server.port);
    println!("  streaming:      {}", config.relay.stream);
    println!("  detached acks:  {}", config.relay.detach);
    println!(
        "  management API: {}",
        if config.api_server.api_key.is_some() {
            "bearer key required"
        } else {
            "unauthenticated"
        }
    );

    if probe {
        let zoom = ZoomChannel::new(&config.zoom, config.relay.request_timeout)?;
        zoom.tokens().get_token().await?;
        println!("  Zoom token:     ok");
    }

    Ok(())
}

async fn send(
    config: &Config,
    to: String,
    message: String,
    reply_to: Option<String>,
) -> anyhow::Result<()> {
    let payload = DirectSendPayload {
        to_jid: to.into(),
        message: message.into(),
        reply_to: reply_to.map_or(serde_json::Value::Null, Into::into),
    };
    let send = payload.validate()?;

    let zoom = ZoomChannel::new(&config.zoom, config.relay.request_timeout)?;
    let sent = zoom
        .send_message(send.to_jid.as_str(), &send.message, send.reply_to.as_deref())
        .await?;

    println!("{}", serde_json::to_string_pretty(&sent)?);
    Ok(())
}
