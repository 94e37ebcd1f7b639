use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tracing::info;
use waymark_map::MapConfig;

#[derive(Debug, Parser)]
#[command(name = "waymark-server", about = "Local HTTP service for the Waymark collectible map")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value_t = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 39333))]
    addr: SocketAddr,

    /// SQLite database path (default: ~/.waymark/waymark.db).
    #[arg(long)]
    db: Option<PathBuf>,

    /// YAML file with viewport, clustering and routing settings.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waymark_server=info,waymark_map=info".into()),
        )
        .init();

    let args = Args::parse();
    let db_path = args.db.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".waymark")
            .join("waymark.db")
    });
    let config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading map config");
            MapConfig::load(path)?
        }
        None => MapConfig::default(),
    };

    info!(addr = %args.addr, db = %db_path.display(), "starting waymark server");
    waymark_server::serve(args.addr, db_path, config).await
}
