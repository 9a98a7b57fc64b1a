use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use replica::http::handlers::PublishRequest;

#[derive(Parser)]
#[command(name = "replica-cli")]
#[command(about = "Publish to and subscribe from a replica broker", long_about = None)]
struct Cli {
    /// Broker address (host:port).
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish one message to a topic
    Publish {
        #[arg(short, long)]
        channel: String,
        #[arg(short, long)]
        data: String,
    },
    /// Subscribe to topics and print delivered messages
    Subscribe {
        #[arg(required = true)]
        topics: Vec<String>,
    },
    /// Show broker status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Publish { channel, data } => {
            let res = reqwest::Client::new()
                .post(format!("http://{}/publish", cli.addr))
                .json(&PublishRequest { channel, data })
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Status => {
            let res = reqwest::get(format!("http://{}/status", cli.addr)).await?;
            print_response(res).await?;
        }
        Commands::Subscribe { topics } => {
            let mut stream = TcpStream::connect(&cli.addr).await?;
            let mut request = topics.join("\n");
            request.push('\n');
            stream.write_all(request.as_bytes()).await?;

            let mut lines = BufReader::new(stream).lines();
            while let Some(line) = lines.next_line().await? {
                println!("{}", line);
            }
            eprintln!("Connection closed by broker");
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: broker returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
