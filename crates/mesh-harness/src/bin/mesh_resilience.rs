//! Mesh Resilience Runner CLI
//!
//! Usage:
//!   mesh-resilience run [--trials N] [--requests N] [--seed S] [--output FORMAT]
//!   mesh-resilience report <json-file>
//!
//! Examples:
//!   mesh-resilience run                          # Defaults, Markdown to stdout
//!   mesh-resilience run --trials 100 --seed 42
//!   mesh-resilience run --output json > report.json
//!   mesh-resilience report report.json           # Re-render a saved report

use std::env;
use std::fs;
use std::process::ExitCode;

use mesh_harness::prelude::*;
use mesh_harness::reports::ResilienceReport;

fn main() -> ExitCode {
    tracing_subscriber_init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    match args[1].as_str() {
        "run" => run_trials(&args[2..]),
        "report" => render_report(&args[2..]),
        "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage();
            ExitCode::from(1)
        }
    }
}

fn tracing_subscriber_init() {
    // Trace output goes to stderr so stdout stays machine-parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mesh_harness=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!(
        r#"Mesh Resilience Runner

USAGE:
    mesh-resilience <COMMAND> [OPTIONS]

COMMANDS:
    run      Run resilience trials against random mesh topologies
    report   Re-render a saved JSON report

RUN OPTIONS:
    --trials N        Number of trials (default: 25)
    --requests N      Route requests per trial (default: 40)
    --node-failures N Relays forced offline per trial (default: 1)
    --link-failures N Links forced inactive per trial (default: 2)
    --seed S          Random seed (default: 0 = nondeterministic)
    --output FORMAT   Output format: text, json, markdown (default: text)

EXAMPLES:
    mesh-resilience run
    mesh-resilience run --trials 100 --seed 42 --output json > report.json
    mesh-resilience report report.json --output markdown
"#
    );
}

fn parse_config(args: &[String]) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--trials" if i + 1 < args.len() => {
                config.trials = args[i + 1].parse().unwrap_or(config.trials);
                i += 2;
            }
            "--requests" if i + 1 < args.len() => {
                config.requests_per_trial =
                    args[i + 1].parse().unwrap_or(config.requests_per_trial);
                i += 2;
            }
            "--node-failures" if i + 1 < args.len() => {
                config.node_failures = args[i + 1].parse().unwrap_or(config.node_failures);
                i += 2;
            }
            "--link-failures" if i + 1 < args.len() => {
                config.link_failures = args[i + 1].parse().unwrap_or(config.link_failures);
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                config.seed = args[i + 1].parse().unwrap_or(0);
                i += 2;
            }
            _ => i += 1,
        }
    }

    config
}

fn output_format(args: &[String]) -> &str {
    for i in 0..args.len() {
        if args[i] == "--output" && i + 1 < args.len() {
            return match args[i + 1].as_str() {
                "json" => "json",
                "markdown" | "md" => "markdown",
                _ => "text",
            };
        }
    }
    "text"
}

fn run_trials(args: &[String]) -> ExitCode {
    let config = parse_config(args);
    let format = output_format(args);

    eprintln!(
        "Mesh resilience run: {} trials x {} requests (seed {})",
        config.trials, config.requests_per_trial, config.seed
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    let mut runner = ResilienceRunner::new(config.clone());
    runtime.block_on(runner.run());

    let report = ResilienceReport::new(config, runner.results().to_vec());

    match format {
        "json" => println!("{}", report.to_json()),
        "markdown" => println!("{}", report.to_markdown()),
        _ => report.print(),
    }

    if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn render_report(args: &[String]) -> ExitCode {
    if args.is_empty() {
        eprintln!("Usage: mesh-resilience report <json-file>");
        return ExitCode::from(1);
    }

    let format = output_format(args);
    match fs::read_to_string(&args[0]) {
        Ok(json) => match serde_json::from_str::<ResilienceReport>(&json) {
            Ok(report) => {
                match format {
                    "json" => println!("{}", report.to_json()),
                    "markdown" => println!("{}", report.to_markdown()),
                    _ => report.print(),
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to parse JSON: {}", e);
                ExitCode::from(1)
            }
        },
        Err(e) => {
            eprintln!("Failed to read file: {}", e);
            ExitCode::from(1)
        }
    }
}
