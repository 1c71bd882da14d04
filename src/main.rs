//! bench-core-cli entry point.
//!
//! ## CLI Subcommands
//!
//! - `bench-core-cli run [--plan FILE] [--quick] [--json] [--local]` - Run a benchmark
//! - `bench-core-cli catalog [--json]` - List standard test cases
//! - `bench-core-cli models` - List model files in `BENCH_CORE_MODEL_DIR`
//! - `bench-core-cli config [show|defaults|validate]` - Inspect configuration

use std::process::ExitCode;

use bench_core::cli::{catalog_cmd, config_cmd, models_cmd, run_benchmark};
use bench_core::config;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let json = args.iter().skip(2).any(|a| a == "--json");

    match command {
        "run" => {
            let code = run_benchmark(&args[2..]).await;
            ExitCode::from(code as u8)
        }
        "catalog" => ExitCode::from(catalog_cmd::run_list(json) as u8),
        "models" => {
            let model_dir = config::load().model_dir;
            ExitCode::from(models_cmd::run_list(&model_dir) as u8)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" | "--json" => {
                    config_cmd::run_show(json);
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_usage();
                    ExitCode::FAILURE
                }
            }
        }
        "version" | "--version" | "-V" => {
            println!("bench-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "bench-core - on-device LLM provider benchmarks v{}

USAGE:
    bench-core-cli <COMMAND> [OPTIONS]

COMMANDS:
    run          Run a benchmark session
    catalog      List the standard test cases
    models       List model files the local backends can load
    config       Show, validate or list default configuration
    version      Show version information
    help         Show this help message

RUN OPTIONS:
    --plan FILE  Load providers and test cases from a TOML plan
    --quick      Run the quick suite instead of the full catalog
    --json       Print the session, stats and provider summaries as JSON
    --local      Use llama.cpp for the native provider (gguf feature)

EXAMPLES:
    bench-core-cli run --quick
    bench-core-cli run --plan nightly.toml --json > report.json
    bench-core-cli config validate

ENVIRONMENT:
    BENCH_CORE_INTER_TEST_DELAY_MS  Pause between attempts (default: 2000)
    BENCH_CORE_PROMPT_MODE          unified or optimized (default: unified)
    BENCH_CORE_MODEL_DIR            Model directory (default: models)
    BENCH_CORE_LOG_LEVEL            tracing filter (default: info)
    Run `bench-core-cli config defaults` for the full list.

EXIT CODES:
    0  Success
    1  Failure / session did not complete
    2  Usage or configuration error
",
        version
    );
}
