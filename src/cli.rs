use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::app_state::AppState;
use crate::config_loader::{load_config, PortalConfig, ProfileBackend};
use crate::profile_store::{FirestoreProfileStore, InMemoryProfileStore, ProfileStore};
use crate::routes::{self, Access};

/// Top-level CLI interface for the portal
#[derive(Parser)]
#[command(
    name = "risetech-portal",
    version = "0.1.0",
    about = "RiseTech portal session and access server"
)]
pub struct Cli {
    /// Configuration file (defaults to ./portal.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the portal over HTTP
    Serve {
        /// Host/IP to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the route table
    Routes,

    /// Look a single profile up in the configured profile store
    CheckProfile {
        #[arg(long)]
        uid: String,
        /// Bearer token for the lookup, if the store requires one
        #[arg(long)]
        token: Option<String>,
    },
}

pub fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(serve(config))
        }
        Commands::Routes => {
            print_routes();
            Ok(())
        }
        Commands::CheckProfile { uid, token } => {
            let config = load_config(cli.config.as_deref())?;
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            rt.block_on(check_profile(&config, &uid, token.as_deref()))
        }
    }
}

async fn serve(config: PortalConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {addr}: {e}"))?;

    let (state, resolver) = AppState::bootstrap(&config)?;
    let app = crate::web::build_portal_router(state);

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    tracing::info!(%addr, "HTTP server listening");
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    resolver.shutdown().await;
    tracing::info!("server stopped");
    Ok(result?)
}

fn print_routes() {
    println!("{:<18} {:<16} PAGE", "PATH", "ACCESS");
    println!("{:<18} {:<16} redirect to login", "/", "public");
    for route in routes::ROUTES {
        let access = match route.access {
            Access::Public => "public".to_string(),
            Access::Roles(roles) => roles
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(","),
        };
        println!("{:<18} {:<16} {}", route.path, access, route.page.title());
    }
}

async fn check_profile(config: &PortalConfig, uid: &str, token: Option<&str>) -> anyhow::Result<()> {
    let store: Box<dyn ProfileStore> = match config.profile_store.backend {
        ProfileBackend::Firestore => Box::new(FirestoreProfileStore::new(&config.profile_store)?),
        ProfileBackend::Memory => Box::new(InMemoryProfileStore::seeded(&config.profile_store.profiles)),
    };

    match store.get_profile(uid, token).await? {
        Some(profile) => {
            println!("{}", serde_json::to_string_pretty(&profile)?);
            match profile.role() {
                Some(role) => println!("role: {role}"),
                None => println!("role: (none)"),
            }
        }
        None => println!("No profile record for {uid}"),
    }
    Ok(())
}
