use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "configctl")]
#[command(about = "Command-line client for the live-config service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// API key sent as X-API-Key.
    #[arg(short, long)]
    key: Option<String>,

    /// Only apply the change if the document is still at this version.
    #[arg(long)]
    version: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the document, schema, modifiable paths and version
    Get,
    /// Run a query such as /users/[?age>25]/name
    Query { query: String },
    /// Insert a JSON value into an array
    Insert {
        path: String,
        index: usize,
        value: String,
    },
    /// Remove an element from an array
    Remove { path: String, index: usize },
    /// Replace the value at a path with JSON
    Replace { path: String, value: String },
    /// Check that the service is up
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert("x-api-key", HeaderValue::from_str(key)?);
    }

    let body = match &cli.command {
        Commands::Get => {
            let res = client
                .get(format!("{}/config", cli.url))
                .headers(headers)
                .send()
                .await?;
            return print_response(res).await;
        }
        Commands::Query { query } => {
            let res = client
                .get(format!("{}/query", cli.url))
                .query(&[("q", query)])
                .headers(headers)
                .send()
                .await?;
            return print_response(res).await;
        }
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            return print_response(res).await;
        }
        Commands::Insert { .. } | Commands::Remove { .. } | Commands::Replace { .. } => {
            mutation_body(&cli.command, cli.version).ok_or("not a mutating command")?
        }
    };

    let res = client
        .post(format!("{}/config", cli.url))
        .headers(headers)
        .json(&body)
        .send()
        .await?;
    print_response(res).await
}

/// POST /config body for a mutating command; `None` for reads.
fn mutation_body(command: &Commands, version: Option<i64>) -> Option<Value> {
    let mut body = match command {
        Commands::Insert { path, index, value } => {
            json!({"op": "insert", "path": path, "index": index, "value": parse_value(value)})
        }
        Commands::Remove { path, index } => json!({"op": "remove", "path": path, "index": index}),
        Commands::Replace { path, value } => {
            json!({"op": "replace", "path": path, "value": parse_value(value)})
        }
        Commands::Get | Commands::Query { .. } | Commands::Health => return None,
    };
    if let (Some(version), Some(fields)) = (version, body.as_object_mut()) {
        fields.insert("version".to_string(), json!(version));
    }
    Some(body)
}

/// Values are JSON; anything that does not parse is sent as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        Err(_) => println!("{}", text),
    }
    if !status.is_success() {
        return Err(format!("request failed with status {}", status).into());
    }
    Ok(())
}
