//! snmpcol: scrape one SNMP target and print the metrics.
//!
//! Loads a module from a YAML configuration file, runs a single scrape
//! against the target, and writes the Prometheus text exposition to
//! stdout. Exits non-zero when the scrape produced an error sample.

use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use snmp_collector::{Collector, Config, Sample, registry_from_samples};
use std::process::ExitCode;

/// Scrape an SNMP target and print Prometheus metrics.
#[derive(Debug, Parser)]
#[command(name = "snmpcol", version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "snmp.yml")]
    config: String,

    /// Module to scrape with.
    #[arg(short, long, default_value = "default")]
    module: String,

    /// Target device, `host` or `host:port` (default port 161).
    #[arg(value_name = "TARGET")]
    target: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match Config::load_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(module) = config.module(&args.module) else {
        eprintln!("Error: module {:?} not found in {}", args.module, args.config);
        return ExitCode::FAILURE;
    };

    let collector = Collector::new(args.target.clone(), module.clone());
    let samples = collector.collect().await;
    let failed = samples
        .iter()
        .any(|sample| matches!(sample, Sample::Invalid { .. }));

    let registry = registry_from_samples(&samples);
    let mut families = registry.gather();
    // Process-wide metrics (the unexpected-PDU-type counter) live in the
    // default registry.
    families.extend(prometheus::gather());

    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        eprintln!("Error encoding metrics: {}", e);
        return ExitCode::FAILURE;
    }
    match String::from_utf8(buf) {
        Ok(text) => print!("{}", text),
        Err(e) => {
            eprintln!("Error encoding metrics: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
