use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "push-cli")]
#[command(about = "Operator CLI for the push gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Shared send secret
    #[arg(short, long, env = "PUSH_GATEWAY_SEND_SECRET", hide_env_values = true)]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a notification to every subscriber
    Send {
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Show the public key clients subscribe with
    PublicKey,
    /// Check that the gateway is up
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    match cli.command {
        Commands::Send {
            title,
            body,
            url,
            tag,
        } => {
            let mut payload = json!({ "title": title });
            if let Some(body) = body {
                payload["body"] = Value::String(body);
            }
            if let Some(url) = url {
                payload["url"] = Value::String(url);
            }
            if let Some(tag) = tag {
                payload["tag"] = Value::String(tag);
            }
            let res = client
                .post(format!("{}/push-send", cli.url))
                .headers(headers)
                .json(&payload)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::PublicKey => {
            let res = client
                .get(format!("{}/push-public-key", cli.url))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            let status = res.status();
            println!("{} {}", status, res.text().await?);
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
