//! swival - sandboxed coding agent runtime.
//!
//! Thin binary entry point: argument parsing, sandbox re-exec, wiring of
//! the session, and the run itself live here; everything else is in
//! `swival-core`.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

use swival_core::cli::Cli;
use swival_core::config::constants::SYSTEM_PREAMBLE;
use swival_core::core::{AgentRunner, RunnerConfig};
use swival_core::instructions::load_instruction_files;
use swival_core::llm::{OpenAiCompatProvider, SamplingParams};
use swival_core::llm::provider::LlmProvider;
use swival_core::report::{Outcome, ReportRecorder};
use swival_core::sandbox;

mod main_helpers;

use main_helpers::{
    build_context_manager, build_registry, build_session, build_settings, initialize_tracing,
    resolve_base_dir,
};

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build Tokio runtime")
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: {err:?}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    initialize_tracing();

    if cli.sandbox_strict_read {
        sandbox::reject_strict_read()?;
    }

    let base_dir = resolve_base_dir(&cli)?;

    if cli.sandbox.is_some() && !sandbox::inside_sandbox() {
        let session_id = match (&cli.sandbox_session, cli.no_sandbox_auto_session) {
            (Some(id), _) => id.clone(),
            (None, true) => {
                bail!("--no-sandbox-auto-session requires an explicit --sandbox-session")
            }
            (None, false) => sandbox::derive_session_id(&base_dir),
        };
        info!(session = session_id.as_str(), "re-execing under overlay sandbox");
        sandbox::reexec_under_overlay(&session_id)?;
    }

    if cli.task.is_none() && !cli.repl {
        bail!("a task argument is required unless --repl is set");
    }

    let api_key = std::env::var(&cli.api_key_env).unwrap_or_else(|_| {
        warn!(env = cli.api_key_env.as_str(), "API key variable is not set");
        String::new()
    });
    let provider: Arc<dyn LlmProvider> =
        Arc::new(OpenAiCompatProvider::new(cli.base_url.clone(), api_key));

    let session = build_session(&cli, &base_dir)?;
    let context = build_context_manager(&cli);
    let (registry, mcp_pool) = build_registry(&cli, &base_dir, &context).await?;

    let instructions = load_instruction_files(&base_dir);
    let settings = build_settings(&cli, &instructions);
    let report = ReportRecorder::new(
        cli.task.clone().unwrap_or_else(|| "(repl)".to_string()),
        cli.model.clone(),
        provider.name().to_string(),
        settings,
    );

    let runner_config = RunnerConfig {
        model: cli.model.clone(),
        max_turns: cli.max_turns,
        sampling: SamplingParams {
            temperature: cli.temperature,
            top_p: cli.top_p,
            seed: cli.seed,
        },
        proactive_summaries: cli.proactive_summaries,
        system_preamble: SYSTEM_PREAMBLE.to_string(),
        instructions,
    };

    let mut runner = AgentRunner::new(
        runner_config,
        provider,
        Arc::new(registry),
        Arc::clone(&session),
        context,
        report,
    );

    // A single ctrl-c aborts the in-flight call and tool, then the loop
    // winds down with outcome `error`.
    {
        let cancel = session.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; cancelling run");
                cancel.cancel();
            }
        });
    }

    let exit = if cli.repl {
        run_repl(&mut runner).await?
    } else {
        let task = cli.task.clone().expect("validated above");
        let summary = runner.run_task(&task).await;
        let cancelled = session.cancel.is_cancelled();

        if cancelled {
            session.caps.sweep_all();
        } else {
            session.caps.sweep_stale();
        }

        let exit = ExitCode::from(summary.outcome.exit_code() as u8);
        match &cli.report {
            Some(path) => {
                let report = runner.into_report(&summary);
                report
                    .write_atomic(path)
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
                if let Some(message) = &summary.error_message {
                    eprintln!("run failed: {message}");
                }
            }
            None => {
                match (&summary.answer, &summary.error_message) {
                    (Some(answer), _) => println!("{answer}"),
                    (None, Some(message)) => eprintln!("run failed: {message}"),
                    (None, None) => eprintln!("run ended without an answer"),
                }
            }
        }
        exit
    };

    if let Some(pool) = mcp_pool {
        pool.shutdown_all();
    }
    Ok(exit)
}

/// Plain stdin REPL: one prompt per line, answer on stdout. Line-editor
/// niceties are deliberately out of scope.
async fn run_repl(runner: &mut AgentRunner) -> Result<ExitCode> {
    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin).lines();

    loop {
        eprint!("swival> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if runner.session().cancel.is_cancelled() {
            break;
        }

        let summary = runner.run_segment(prompt).await;
        match summary.outcome {
            Outcome::Success => {
                if let Some(answer) = summary.answer {
                    println!("{answer}");
                }
            }
            Outcome::Exhausted => eprintln!("turn budget exhausted for this prompt"),
            Outcome::Error => {
                if let Some(message) = summary.error_message {
                    eprintln!("error: {message}");
                }
                break;
            }
        }
    }
    runner.session().caps.sweep_stale();
    Ok(ExitCode::SUCCESS)
}
