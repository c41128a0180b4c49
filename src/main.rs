//! ops-assistant 命令行入口
//!
//! 子命令：run（执行单个任务）、tools（列出工具）、interactive（交互模式）、cache-stats、version。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use ops_assistant::core::{create_agent_builder, AgentComponents, OrchestratorResult, OrchestratorState};
use ops_assistant::observability;

#[derive(Parser, Debug)]
#[command(name = "ops-assistant")]
#[command(about = "Multi-agent operations assistant: plan, execute, verify")]
#[command(disable_version_flag = true)]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single task through the pipeline
    Run {
        /// Natural language task
        task: String,

        /// Show plan, collected data and debug logs
        #[arg(short, long)]
        verbose: bool,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available tools and actions
    Tools,
    /// Read tasks from stdin until "exit"
    Interactive,
    /// Show result cache statistics
    CacheStats,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let builder = create_agent_builder(cli.config.clone());

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    let level = if verbose { "debug" } else { builder.config().app.log_level.as_str() };
    observability::init(level);

    match cli.command {
        Commands::Run { task, verbose, json } => {
            let components = builder.build_components();
            let result = run_task(&components, &task, !json).await;
            if json {
                let out = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
                println!("{out}");
            } else {
                print_result(&result, verbose);
            }
            if result.state == OrchestratorState::Error {
                std::process::exit(1);
            }
        }
        Commands::Tools => {
            let components = builder.build_components();
            for schema in components.registry.schemas() {
                println!("{}", schema.to_prompt_section());
            }
        }
        Commands::Interactive => interactive(&builder.build_components()).await?,
        Commands::CacheStats => {
            let components = builder.build_components();
            let metrics = serde_json::to_string_pretty(&components.cache.metrics())
                .context("Failed to serialize cache metrics")?;
            println!("{metrics}");
        }
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// 运行一个任务；progress 为 true 时在 stderr 上显示阶段进度
async fn run_task(components: &AgentComponents, task: &str, progress: bool) -> OrchestratorResult {
    let orchestrator = components.orchestrator();
    let mut state_rx = orchestrator.subscribe();

    let watcher = progress.then(|| {
        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let state = *state_rx.borrow_and_update();
                if state.is_terminal() {
                    break;
                }
                if state != OrchestratorState::Idle {
                    eprintln!("⏳ {}", state.progress_label());
                }
            }
        })
    });

    let result = orchestrator.run(task, None).await;
    drop(orchestrator);
    if let Some(handle) = watcher {
        let _ = handle.await;
    }
    result
}

fn print_result(result: &OrchestratorResult, verbose: bool) {
    println!();
    if let Some(error) = &result.error {
        println!("❌ Error: {error}");
    }

    if verbose {
        if let Some(plan) = &result.plan {
            println!("📋 Plan: {}", plan.task_understanding);
            for step in &plan.steps {
                println!("  {}. {}.{} {:?}", step.step_number, step.tool, step.action, step.depends_on);
            }
        }
    }

    if let Some(output) = &result.output {
        println!("Status: {}", output.status);
        println!("\n{}\n", output.summary);
        if verbose && !output.data.is_empty() {
            if let Ok(data) = serde_json::to_string_pretty(&output.data) {
                println!("Data:\n{data}\n");
            }
        }
        for error in &output.errors {
            println!("⚠️  {error}");
        }
        let d = &output.execution_details;
        println!(
            "Steps: {}/{} succeeded | cached: {} | completeness: {:.0}% | task: {}",
            d.steps_succeeded,
            d.steps_total,
            d.cached_results,
            d.completeness_score * 100.0,
            d.task_id
        );
    }
    println!("Time: {:.0} ms", result.execution_time_ms);
}

async fn interactive(components: &AgentComponents) -> anyhow::Result<()> {
    println!("ops-assistant interactive mode. Type a task, 'tools', 'cache' or 'exit'.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "tools" => {
                for name in components.registry.tool_names() {
                    println!("  {name}");
                }
            }
            "cache" => {
                let m = components.cache.metrics();
                println!(
                    "hits={} misses={} hit_rate={:.2} size={}/{}",
                    m.hits, m.misses, m.hit_rate, m.size, m.max_size
                );
            }
            task => {
                let result = run_task(components, task, true).await;
                print_result(&result, false);
            }
        }
    }
    Ok(())
}
