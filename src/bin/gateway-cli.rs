use axum::http::Method;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

use secure_gateway::crypto::envelope::{decode, seal};
use secure_gateway::crypto::{parse_public_key, Envelope, ServerKeys};
use secure_gateway::security::signature::sign;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Key and envelope tooling for the secure gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a server key pair (PKCS#8 private, SPKI public)
    Keygen {
        #[arg(long, default_value_t = 2048)]
        bits: usize,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Seal a JSON document for the holder of a public key
    Seal {
        #[arg(long)]
        public_key: PathBuf,
        #[arg(long)]
        json: String,
    },
    /// Open an envelope with a private key
    Open {
        #[arg(long)]
        private_key: PathBuf,
        /// Envelope JSON, or @file
        #[arg(long)]
        envelope: String,
    },
    /// Compute a request signature
    Sign {
        #[arg(long, env = "GATEWAY_SIGNATURE_SECRET")]
        secret: String,
        #[arg(long)]
        method: String,
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Unix seconds; defaults to now
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Check gateway health
    Health {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },
}

fn read_arg(value: &str) -> Result<String, std::io::Error> {
    match value.strip_prefix('@') {
        Some(path) => fs::read_to_string(path),
        None => Ok(value.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { bits, out_dir } => {
            let keys = ServerKeys::generate(bits)?;
            let private_path = out_dir.join("gateway_private.pem");
            let public_path = out_dir.join("gateway_public.pem");
            fs::write(&private_path, keys.private_key_pem()?)?;
            fs::write(&public_path, keys.public_key_pem())?;
            println!("wrote {}", private_path.display());
            println!("wrote {}", public_path.display());
        }
        Commands::Seal { public_key, json } => {
            let key = parse_public_key(&fs::read_to_string(public_key)?)?;
            let value: Value = serde_json::from_str(&read_arg(&json)?)?;
            let envelope = seal(&value, &key)?;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        Commands::Open {
            private_key,
            envelope,
        } => {
            let keys = ServerKeys::from_pem(&fs::read_to_string(private_key)?)?;
            let raw = read_arg(&envelope)?;
            // fail early on shape errors with a clearer message
            let _: Envelope = serde_json::from_str(&raw)?;
            let value = decode(raw.as_bytes(), keys.private_key())?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Sign {
            secret,
            method,
            path,
            body,
            timestamp,
        } => {
            let method: Method = method.to_uppercase().parse()?;
            let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
            let body = read_arg(&body)?;
            let signature = sign(secret.as_bytes(), timestamp, &method, &path, body.as_bytes())
                .map_err(|e| e.to_string())?;
            println!("x-signature-timestamp: {timestamp}");
            println!("x-signature: {signature}");
        }
        Commands::Health { url } => {
            let res = reqwest::get(format!("{}/health", url.trim_end_matches('/'))).await?;
            print_response(res).await?;
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
