use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Inspect a cluster-proxy node through its admin listener", long_about = None)]
struct Cli {
    /// Admin base URL of the node.
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Liveness and build version
    Health,
    /// Whether the node accepts traffic
    Ready,
    /// Cluster members and endpoint registrations
    Netmap,
    /// Gossip members, suspicions and counters
    Gossip,
    /// Local upstreams and request outcomes
    Proxy,
    /// One member of the network map
    Node { id: String },
}

impl Commands {
    fn path(&self) -> String {
        match self {
            Commands::Health => "/health".into(),
            Commands::Ready => "/ready".into(),
            Commands::Netmap => "/status/netmap".into(),
            Commands::Gossip => "/status/gossip".into(),
            Commands::Proxy => "/status/proxy".into(),
            Commands::Node { id } => format!("/status/netmap/nodes/{id}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.path());
    let res = reqwest::get(&url).await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: admin API returned status {status}");
        if !text.is_empty() {
            eprintln!("{text}");
        }
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    Ok(())
}
