//! Operational CLI: loads a gateway configuration file, builds a
//! `Gateway`, runs one health snapshot, and prints it. Useful for
//! validating a configuration document and confirming engine
//! reachability before wiring the gateway into a route layer.

use std::env;
use std::process::ExitCode;

use engine_orchestrator::config::GatewayConfig;
use engine_orchestrator::gateway::Gateway;

fn print_usage() {
    eprintln!("operational CLI for the engine orchestration core");
    eprintln!();
    eprintln!("Usage: gateway-probe <config.json>");
    eprintln!();
    eprintln!("  <config.json>   Path to a GatewayConfig document (see docs for schema).");
    eprintln!("  --help          Print this message.");
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return if args.is_empty() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
    }

    let config_path = &args[0];
    let config = match GatewayConfig::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration from {config_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let engine_count = config.engines.len();
    let model_count = config.models.len();

    let gateway = match Gateway::builder(config).build() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("failed to build gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("gateway assembled: {engine_count} engines, {model_count} models");

    // Give the monitor's first tick a moment to run before snapshotting.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let snapshot = gateway.health().await;
    println!("degraded: {}", snapshot.degraded);
    for (id, health) in &snapshot.per_engine {
        println!("  {id}: {:?}", health.phase);
    }

    gateway.shutdown();
    ExitCode::SUCCESS
}
