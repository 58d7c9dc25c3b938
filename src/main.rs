use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use coap_actuator::actuator::create_actuator;
use coap_actuator::coap::{CoapClient, CoapServer, Code};
use coap_actuator::{ActivityLedger, Config, Dispatcher, Method, MonotonicClock, Resource, SessionManager};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Token-guarded actuator service over CoAP, and a client for it.
#[derive(Parser, Debug)]
#[command(name = "coap-actuator", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (overrides RUST_LOG), e.g. "debug" or "coap_actuator=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the device service
    Serve {
        /// Override server.host
        #[arg(long)]
        host: Option<String>,
        /// Override server.port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Register a new user
    Register {
        server: String,
        username: String,
        password: String,
    },
    /// Log in and print the session token
    Login {
        server: String,
        username: String,
        password: String,
    },
    /// Switch the LED or read its state
    Led {
        server: String,
        token: String,
        action: LedAction,
    },
    /// Show the dashboard summary
    Dashboard { server: String, token: String },
    /// Show recent LED activity
    Logs { server: String, token: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LedAction {
    On,
    Off,
    Get,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;
            serve(&config).await
        }
        Commands::Register {
            server,
            username,
            password,
        } => {
            let payload = format!("{username}:{password}");
            call(&config, &server, Method::Post, Resource::Register, &payload).await
        }
        Commands::Login {
            server,
            username,
            password,
        } => {
            let payload = format!("{username}:{password}");
            call(&config, &server, Method::Post, Resource::Login, &payload).await
        }
        Commands::Led {
            server,
            token,
            action,
        } => {
            let (method, payload) = match action {
                LedAction::On => (Method::Put, format!("{token}:1")),
                LedAction::Off => (Method::Put, format!("{token}:0")),
                LedAction::Get => (Method::Get, token),
            };
            call(&config, &server, method, Resource::Led, &payload).await
        }
        Commands::Dashboard { server, token } => {
            call(&config, &server, Method::Get, Resource::Dashboard, &token).await
        }
        Commands::Logs { server, token } => {
            call(&config, &server, Method::Get, Resource::Logs, &token).await
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn serve(config: &Config) -> Result<()> {
    let actuator = create_actuator(&config.actuator)?;
    let backend = actuator.name().to_string();

    let dispatcher = Dispatcher::new(actuator, MonotonicClock::new())
        .with_sessions(SessionManager::new(config.session_ttl()))
        .with_ledger(ActivityLedger::with_capacity(config.ledger.capacity))
        .with_log_page(config.ledger.page_size);
    let server = CoapServer::bind(config.bind_addr()?, dispatcher)
        .await?
        .with_max_datagram(config.server.max_datagram);

    tracing::info!(
        actuator = %backend,
        session_ttl_secs = config.session.ttl_secs,
        ledger_capacity = config.ledger.capacity,
        "CoAP server listening on {}",
        server.local_addr()?
    );
    for resource in Resource::ALL {
        tracing::info!("  {}", resource.usage());
    }

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
}

async fn call(
    config: &Config,
    server: &str,
    method: Method,
    resource: Resource,
    payload: &str,
) -> Result<()> {
    let client = CoapClient::connect(server, config.client_timeout()).await?;
    let response = client
        .request(method, resource.as_str(), payload.as_bytes())
        .await?;

    if response.code == Code::CONTENT {
        println!("{}", response.text());
    } else {
        println!("{} {}", response.code, response.text());
    }
    Ok(())
}
