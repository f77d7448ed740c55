use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "tracker-cli")]
#[command(about = "Management CLI for the failed-request tracker", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:7402")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored failures, newest first
    List,
    /// Delete every stored failure
    Clear,
    /// Check tracker status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = match cli.command {
        Commands::List => {
            client
                .post(format!("{}/command", cli.url))
                .json(&json!({"action": "getFailedRequests"}))
                .send()
                .await?
        }
        Commands::Clear => {
            client
                .post(format!("{}/command", cli.url))
                .json(&json!({"action": "clearFailedRequests"}))
                .send()
                .await?
        }
        Commands::Status => client.get(format!("{}/status", cli.url)).send().await?,
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: tracker returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    if let Some(error) = json.get("error").and_then(Value::as_str) {
        eprintln!("Error: {}", error);
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
