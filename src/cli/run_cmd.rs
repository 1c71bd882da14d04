//! Run CLI subcommand: execute a benchmark session and report it.

use std::path::PathBuf;

use serde::Serialize;

use crate::backend::{BackendRegistry, PromptMode, ProviderId};
use crate::benchmark::{
    catalog, compute_stats, provider_summaries, BenchmarkPlan, BenchmarkSession, BenchmarkStats,
    BenchmarkStatus, ProviderSummary,
};
use crate::config::{self, EnvConfig};
use crate::telemetry;
use crate::BenchRuntime;

use super::truncate;

/// Parsed `run` flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    pub plan: Option<PathBuf>,
    pub quick: bool,
    pub json: bool,
    /// Load real model files for the native provider (needs the `gguf` feature).
    pub local: bool,
}

impl RunArgs {
    /// Parse the arguments following `run`.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--plan" => {
                    let path = iter.next().ok_or("--plan requires a file path")?;
                    parsed.plan = Some(PathBuf::from(path));
                }
                "--quick" => parsed.quick = true,
                "--json" => parsed.json = true,
                "--local" => parsed.local = true,
                other => return Err(format!("Unknown run option: {}", other)),
            }
        }
        if parsed.plan.is_some() && parsed.quick {
            return Err("--plan and --quick are mutually exclusive".to_string());
        }
        Ok(parsed)
    }
}

/// Everything `run --json` prints.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub session: &'a BenchmarkSession,
    pub stats: BenchmarkStats,
    pub providers: Vec<ProviderSummary>,
}

/// Build the session the flags ask for.
pub fn build_session(args: &RunArgs, default_mode: PromptMode) -> Result<BenchmarkSession, String> {
    if let Some(path) = &args.plan {
        return BenchmarkPlan::load(path)
            .and_then(|plan| plan.into_session(default_mode))
            .map_err(|e| format!("{}: {}", path.display(), e));
    }
    let (name, cases) = if args.quick { ("quick", catalog::quick()) } else { ("full", catalog::all()) };
    Ok(BenchmarkSession::new(name, cases, ProviderId::ALL.to_vec())
        .with_description("Standard catalog against every provider")
        .with_prompt_mode(default_mode))
}

fn build_registry(args: &RunArgs, cfg: &EnvConfig) -> Result<BackendRegistry, String> {
    if !args.local {
        return Ok(crate::demo_registry());
    }
    #[cfg(feature = "gguf")]
    {
        crate::local_registry(cfg).map_err(|e| e.to_string())
    }
    #[cfg(not(feature = "gguf"))]
    {
        let _ = cfg;
        Err("--local requires bench-core built with the `gguf` feature".to_string())
    }
}

/// Run `run`. Exit codes: 0 completed, 1 run failure, 2 usage error.
pub async fn run_benchmark(args: &[String]) -> i32 {
    let args = match RunArgs::parse(args) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            return 2;
        }
    };
    let cfg = config::load();
    if let Err(e) = telemetry::init_logging(&cfg.log) {
        eprintln!("Logging disabled: {}", e);
    }

    let session = match build_session(&args, cfg.prompt_mode) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid plan: {}", e);
            return 2;
        }
    };
    let registry = match build_registry(&args, &cfg) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", e);
            return 2;
        }
    };

    let runtime = BenchRuntime::new(registry, &cfg);
    let reporter = (!args.json).then(|| spawn_progress_reporter(&runtime));
    if let Err(e) = runtime.scheduler.start(session) {
        eprintln!("{}", e);
        return 1;
    }
    let finished = runtime.scheduler.wait_until_finished().await;
    if let Some(handle) = reporter {
        handle.abort();
    }
    let Some(session) = finished else {
        eprintln!("Benchmark session disappeared before finishing");
        return 1;
    };

    let report = RunReport {
        stats: compute_stats(&session.results),
        providers: provider_summaries(&session.results),
        session: &session,
    };
    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                return 1;
            }
        }
    } else {
        print_report(&report);
    }

    if session.status == BenchmarkStatus::Completed {
        0
    } else {
        1
    }
}

fn spawn_progress_reporter(runtime: &BenchRuntime) -> tokio::task::JoinHandle<()> {
    let mut progress = runtime.scheduler.subscribe_progress();
    tokio::spawn(async move {
        let mut last = None;
        while progress.changed().await.is_ok() {
            let p = progress.borrow_and_update().clone();
            let (Some(case), Some(provider)) = (p.current_test_case, p.current_provider) else {
                continue;
            };
            let key = (case.clone(), provider);
            if last.as_ref() != Some(&key) {
                eprintln!(
                    "[{}/{}] {} on {}",
                    p.completed_tests + 1,
                    p.total_tests,
                    case,
                    provider.display_name()
                );
                last = Some(key);
            }
        }
    })
}

pub fn print_report(report: &RunReport<'_>) {
    let session = report.session;
    println!("Session {} ({}) - {:?}", session.name, session.id, session.status);
    println!(
        "{} attempt(s), {} succeeded, {} failed",
        report.stats.total_tests, report.stats.completed_tests, report.stats.failed_tests
    );
    println!();
    println!(
        "{:<16} {:>8} {:>8} {:>12} {:>14} {:>10}",
        "PROVIDER", "RUNS", "OK", "LATENCY(ms)", "FIRST TOK(ms)", "TOK/S"
    );
    println!("{}", "-".repeat(74));
    for s in &report.providers {
        println!(
            "{:<16} {:>8} {:>8} {:>12.1} {:>14.1} {:>10.2}",
            truncate(s.provider.display_name(), 15),
            s.attempts,
            s.successes,
            s.average_latency_ms,
            s.average_first_token_ms,
            s.average_tokens_per_second,
        );
    }
    println!("{}", "-".repeat(74));
    if let (Some(best), Some(worst)) = (report.stats.best_provider, report.stats.worst_provider) {
        println!("Fastest: {}  |  Slowest: {}", best.display_name(), worst.display_name());
    }
    for r in session.results.iter().filter(|r| !r.success) {
        println!(
            "FAILED {} on {}: {}",
            r.test_case_id,
            r.provider.display_name(),
            r.error_message.as_deref().unwrap_or("unknown error")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags() {
        let parsed = RunArgs::parse(&args(&["--quick", "--json"])).unwrap();
        assert!(parsed.quick && parsed.json && !parsed.local);
        assert!(parsed.plan.is_none());

        let parsed = RunArgs::parse(&args(&["--plan", "p.toml"])).unwrap();
        assert_eq!(parsed.plan, Some(PathBuf::from("p.toml")));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(RunArgs::parse(&args(&["--plan"])).is_err());
        assert!(RunArgs::parse(&args(&["--fast"])).is_err());
        assert!(RunArgs::parse(&args(&["--plan", "p.toml", "--quick"])).is_err());
    }

    #[test]
    fn test_default_session_covers_every_provider() {
        let session = build_session(&RunArgs { quick: true, ..Default::default() }, PromptMode::Optimized)
            .unwrap();
        assert_eq!(session.providers, ProviderId::ALL.to_vec());
        assert_eq!(session.test_cases.len(), catalog::quick().len());
        assert_eq!(session.prompt_mode, PromptMode::Optimized);
    }

    #[test]
    fn test_plan_file_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        std::fs::write(&path, "name = \"p\"\nproviders = [\"litert\"]\ntest_cases = [\"perf-short\"]\n")
            .unwrap();
        let parsed = RunArgs { plan: Some(path), ..Default::default() };
        let session = build_session(&parsed, PromptMode::Unified).unwrap();
        assert_eq!(session.total_pairs(), 1);

        let missing = RunArgs { plan: Some(dir.path().join("none.toml")), ..Default::default() };
        assert!(build_session(&missing, PromptMode::Unified).is_err());
    }
}
