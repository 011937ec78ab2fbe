use anyhow::{Context, Result, bail};
use fieldid::{ApiError, Client, Configuration};
use serde_json::Value;
use std::path::Path;

fn main() -> Result<()> {
    // Example program that registers the boundaries in a GeoJSON file.
    // Usage: register_boundaries <input.geojson> [config.yaml] [--dry-run]
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let dry_run = args.iter().any(|a| a == "--dry-run" || a == "-n");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with('-')).collect();

    let Some(input) = positional.first() else {
        bail!("usage: register_boundaries <input.geojson> [config.yaml] [--dry-run]");
    };

    let config = match positional.get(1) {
        Some(path) => Configuration::from_file(Path::new(path.as_str()))?,
        None => Configuration::load()?,
    };

    let text = std::fs::read_to_string(input.as_str())
        .with_context(|| format!("failed to read {}", input))?;
    let payload: Value = serde_json::from_str(&text).context("input is not valid GeoJSON")?;

    let client = Client::new(config)?;
    let resp = client.register_boundaries(&payload, dry_run)?;

    println!("--- Response ---");
    if resp.status().as_u16() == 204 {
        println!("Success - empty response");
    } else if resp.status().is_success() {
        let results: Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        eprint!("{}", ApiError::from_response(resp));
    }
    println!("---");
    Ok(())
}
