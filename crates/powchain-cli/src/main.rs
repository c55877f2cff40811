use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "powchain-cli")]
#[command(about = "CLI client for the proof-of-work chain node")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the live chain and its validation report
    Chain {
        /// Node base URL (e.g. http://127.0.0.1:8080)
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,
    },
    /// Mine a block holding the given payload
    Mine {
        /// Node base URL (e.g. http://127.0.0.1:8080)
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,
        /// Payload, parsed as JSON when possible, kept as a string otherwise
        #[arg(long)]
        data: String,
    },
    /// Upload a chain file (json, yaml or plain text) for validation
    Validate {
        /// Node base URL (e.g. http://127.0.0.1:8080)
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,
        /// Path of the chain document to upload
        #[arg(long)]
        file: PathBuf,
        /// Difficulty to check against, defaults to the node's own
        #[arg(long)]
        difficulty: Option<usize>,
    },
    /// Download the chain in one of the export dialects
    Export {
        /// Node base URL (e.g. http://127.0.0.1:8080)
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,
        /// One of: json, yaml, text
        #[arg(long, default_value = "json")]
        format: String,
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    match cli.cmd {
        Command::Chain { node } => {
            let res = client.get(format!("{node}/chain")).send().await?;
            print_response(res).await?;
        }
        Command::Mine { node, data } => {
            let payload: Value = serde_json::from_str(&data).unwrap_or(Value::String(data));
            let res = client
                .post(format!("{node}/mine"))
                .json(&json!({ "data": payload }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Command::Validate {
            node,
            file,
            difficulty,
        } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let mut req = client.post(format!("{node}/chain/validate")).body(body);
            if let Some(d) = difficulty {
                req = req.query(&[("difficulty", d)]);
            }
            let res = req.send().await?;
            print_response(res).await?;
        }
        Command::Export {
            node,
            format,
            output,
        } => {
            let res = client
                .get(format!("{node}/chain/export/{format}"))
                .send()
                .await?;
            let status = res.status();
            let body = res.text().await?;
            match output {
                Some(path) if status.is_success() => {
                    std::fs::write(&path, &body)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("wrote {}", path.display());
                }
                _ => {
                    println!("status: {status}");
                    println!("{body}");
                }
            }
        }
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {status}");
    println!("{body}");
    Ok(())
}
