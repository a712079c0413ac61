//! Loopback demo for the integrity transport.
//!
//! Every stdin line is written to `raw`. Wire records read from `checksum`
//! pass through a corruptor and are written straight back into `checksum`,
//! so intact lines come back out of `raw` and damaged ones land on
//! `filtered`. A final integrity report is printed to stdout as JSON.

use anyhow::{bail, Context};
use bytes::Bytes;
use conduit_core::{logging, Config};
use conduit_stream::IntegrityTransportSegment;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Debug, Default, PartialEq)]
struct NodeArgs {
    function: Option<String>,
    corrupt: Option<f64>,
    config: Option<PathBuf>,
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&args)?;
    let config = load_config(&args)?;

    if config.demo.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    let transport = Arc::new(IntegrityTransportSegment::from_config(
        &config.transport_config(),
    )?);
    let probability = config.demo.corrupt_probability;
    info!(
        function = %transport.function(),
        corrupt_probability = probability,
        "conduit-node started"
    );

    let wire = tokio::spawn(corrupting_loopback(Arc::clone(&transport), probability));
    let incoming = tokio::spawn(log_incoming(Arc::clone(&transport)));
    let filtered = tokio::spawn(log_filtered(Arc::clone(&transport)));
    let errors = tokio::spawn(log_errors(Arc::clone(&transport)));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        info!(label = "raw outgoing", payload = %line);
        transport.raw().write(Bytes::from(line)).await?;
    }
    transport.raw().end();

    let corrupted = wire.await?;
    let received = incoming.await?;
    let dropped = filtered.await?;
    transport.error().close();
    errors.await?;

    info!(received, dropped, corrupted, "conduit-node finished");
    println!("{}", serde_json::to_string_pretty(&transport.status())?);
    Ok(())
}

fn load_config(args: &NodeArgs) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default_config(),
    };

    if let Some(function) = &args.function {
        config.transport.checksum_function = function.clone();
    }
    if let Some(probability) = args.corrupt {
        config.demo.corrupt_probability = probability;
    }
    config.demo.json_logs |= args.json_logs;

    config.validate()?;
    Ok(config)
}

fn parse_args(args: &[String]) -> anyhow::Result<NodeArgs> {
    let mut parsed = NodeArgs::default();
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        match arg.as_str() {
            "--function" => match args_iter.next() {
                Some(function) => parsed.function = Some(function.clone()),
                None => bail!("--function was provided without a value"),
            },
            "--corrupt" => match args_iter.next() {
                Some(value) => {
                    let probability: f64 = value
                        .parse()
                        .with_context(|| format!("invalid --corrupt value '{value}'"))?;
                    parsed.corrupt = Some(probability);
                }
                None => bail!("--corrupt was provided without a value"),
            },
            "--config" => match args_iter.next() {
                Some(path) => parsed.config = Some(PathBuf::from(path)),
                None => bail!("--config was provided without a path"),
            },
            "--json-logs" => parsed.json_logs = true,
            other => bail!("unknown argument '{other}'"),
        }
    }
    Ok(parsed)
}

/// Zero the last byte with the given probability.
fn maybe_corrupt(wire: Bytes, probability: f64) -> (Bytes, bool) {
    if wire.is_empty() || !rand::thread_rng().gen_bool(probability) {
        return (wire, false);
    }
    let mut bytes = wire.to_vec();
    if let Some(last) = bytes.last_mut() {
        *last = 0;
    }
    (Bytes::from(bytes), true)
}

async fn corrupting_loopback(transport: Arc<IntegrityTransportSegment>, probability: f64) -> u64 {
    let mut corrupted = 0;
    while let Some(wire) = transport.checksum().read().await {
        info!(label = "cksum output", record = %hex::encode(&wire));
        let (wire, damaged) = maybe_corrupt(wire, probability);
        if damaged {
            corrupted += 1;
        }
        if transport.checksum().write(wire).await.is_err() {
            break;
        }
    }
    transport.checksum().end();
    corrupted
}

async fn log_incoming(transport: Arc<IntegrityTransportSegment>) -> u64 {
    let mut received = 0;
    while let Some(payload) = transport.raw().read().await {
        received += 1;
        info!(label = "raw incoming", payload = %String::from_utf8_lossy(&payload));
    }
    received
}

async fn log_filtered(transport: Arc<IntegrityTransportSegment>) -> u64 {
    let mut dropped = 0;
    while let Some(record) = transport.filtered().read().await {
        dropped += 1;
        warn!(label = "filtered", record = %hex::encode(&record));
    }
    dropped
}

async fn log_errors(transport: Arc<IntegrityTransportSegment>) {
    while let Some(item) = transport.error().read().await {
        error!(label = "error", source = %item.label, error = %item.error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn test_parse_args_defaults() {
        assert_eq!(parse_args(&[]).unwrap(), NodeArgs::default());
    }

    #[test]
    fn test_parse_args_all_flags() {
        let parsed = parse_args(&args(&[
            "--function",
            "blake3",
            "--corrupt",
            "0.5",
            "--config",
            "conduit.toml",
            "--json-logs",
        ]))
        .unwrap();

        assert_eq!(parsed.function.as_deref(), Some("blake3"));
        assert_eq!(parsed.corrupt, Some(0.5));
        assert_eq!(parsed.config, Some(PathBuf::from("conduit.toml")));
        assert!(parsed.json_logs);
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(parse_args(&args(&["--corrupt"])).is_err());
        assert!(parse_args(&args(&["--corrupt", "often"])).is_err());
        assert!(parse_args(&args(&["--verbose"])).is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let parsed = NodeArgs {
            function: Some("sha2-512".to_string()),
            corrupt: Some(0.0),
            ..NodeArgs::default()
        };
        let config = load_config(&parsed).unwrap();
        assert_eq!(config.transport.checksum_function, "sha2-512");
        assert_eq!(config.demo.corrupt_probability, 0.0);
    }

    #[test]
    fn test_out_of_range_probability_rejected() {
        let parsed = NodeArgs {
            corrupt: Some(2.0),
            ..NodeArgs::default()
        };
        assert!(load_config(&parsed).is_err());
    }

    #[test]
    fn test_maybe_corrupt_extremes() {
        let wire = Bytes::from_static(b"\x01\x02\x03");
        assert_eq!(maybe_corrupt(wire.clone(), 0.0), (wire.clone(), false));
        assert_eq!(
            maybe_corrupt(wire, 1.0),
            (Bytes::from_static(b"\x01\x02\x00"), true)
        );
    }
}
