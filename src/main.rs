//! RepoLens - Main CLI Entry Point

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use repolens::{
    agent::{AnalysisOutput, AnalysisReport, AnalysisRequest, AnalysisSession, Analyzer, FollowUp},
    cli::{logging, Args, Commands, Config, Credentials},
    models::ChatClient,
    repository::GitHubClient,
    telemetry::{FanoutTracer, LogTracer, TelemetryCollector},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(message) = args.validate() {
        eprintln!("{} {}", "error:".red().bold(), message);
        std::process::exit(2);
    }

    let mut config = Config::load(args.config.clone())?;
    config.apply_env_overrides(|name| std::env::var(name).ok());
    if let Some(model) = &args.model {
        config.model.model = model.clone();
    }
    config.validate()?;

    let format = match args.log_format {
        Some(format) => format,
        None => config.log_format()?,
    };
    let directive = logging::resolve_filter(
        args.verbosity().log_level(),
        std::env::var("RUST_LOG").ok(),
        std::env::var("LOG_LEVEL").ok(),
        &config.logging.level,
    );
    logging::init(&directive, format)?;

    match &args.command {
        Some(Commands::Config) => show_config(&config),
        None => run_analysis(&args, &config).await,
    }
}

fn show_config(config: &Config) -> Result<()> {
    if let Some(path) = Config::default_path() {
        println!("# default location: {}", path.display());
    }
    println!("# credentials: {:?}", Credentials::from_env());
    println!("{}", config.to_toml()?);
    Ok(())
}

async fn run_analysis(args: &Args, config: &Config) -> Result<()> {
    let repo_url = args
        .repo_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("repository URL required"))?;

    let credentials = Credentials::from_env();
    if credentials.model_api_key.is_none() {
        warn!("no model API key set (OPENAI_API_KEY or REPOLENS_MODEL_API_KEY)");
    }
    if credentials.github_token.is_none() {
        warn!("GITHUB_PERSONAL_ACCESS_TOKEN not set, using the anonymous rate limit");
    }

    let source = Arc::new(GitHubClient::new(config.github_config(&credentials))?);
    let model = Arc::new(ChatClient::new(config.chat_config(&credentials))?);

    let collector = Arc::new(TelemetryCollector::new());
    let tracer = FanoutTracer::new()
        .with(collector.clone())
        .with(Arc::new(LogTracer));

    let analyzer = Analyzer::new(source, model, config.session_config())
        .with_accountant(config.token_accountant())
        .with_tracer(Arc::new(tracer));

    let mut request = AnalysisRequest::new(repo_url, args.analysis_type);
    if let Some(prompt) = &args.prompt {
        request = request.with_prompt(prompt.clone());
    }
    let mut session = analyzer.start(request)?;

    let verbosity = args.verbosity();
    let show_progress = verbosity.show_progress() && !args.json;

    let pb = if show_progress {
        Some(spinner(format!(
            "Analyzing {} ({})",
            repo_url,
            args.analysis_type
        ))?)
    } else {
        None
    };
    let result = session.run().await;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if args.json {
                if let Some(report) = session.report() {
                    println!("{}", report.to_json()?);
                }
            } else {
                eprintln!("{} {}", "Analysis failed:".red().bold(), e);
            }
            if verbosity.show_stats() {
                show_stats(&collector, args.json);
            }
            std::process::exit(1);
        }
    };

    if !args.json {
        print_report(&report);
    }

    let mut follow_ups = Vec::with_capacity(args.ask.len());
    let follow_up_result = ask_follow_ups(args, &mut session, show_progress, &mut follow_ups).await;

    if args.json {
        let output = AnalysisOutput {
            report: session.report().unwrap_or(&report),
            follow_ups: &follow_ups,
            follow_up_error: follow_up_result.as_ref().err().map(|e| e.to_string()),
        };
        println!("{}", output.to_json()?);
    }

    if verbosity.show_stats() {
        show_stats(&collector, args.json);
    }

    follow_up_result
}

/// Stats go to stderr when stdout carries JSON
fn show_stats(collector: &TelemetryCollector, json: bool) {
    if json {
        eprintln!("{}", collector.summary());
    } else {
        collector.display_summary();
    }
}

/// Answers are pushed as they arrive so a failure keeps the earlier ones
async fn ask_follow_ups(
    args: &Args,
    session: &mut AnalysisSession,
    show_progress: bool,
    answers: &mut Vec<FollowUp>,
) -> Result<()> {
    for question in &args.ask {
        let pb = if show_progress {
            Some(spinner(format!("Asking: {}", question))?)
        } else {
            None
        };
        let answer = session.ask(question).await;
        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        let answer = answer?;

        if !args.json {
            println!("\n{} {}", "Q:".cyan().bold(), question.bold());
            println!("{}", answer);
        }
        answers.push(FollowUp {
            question: question.clone(),
            answer,
        });
    }

    if !args.ask.is_empty() && !args.json {
        let stats = session.context_stats();
        println!(
            "\n{}",
            format!(
                "Context: {} / {} tokens, {} summaries",
                stats.current_tokens, stats.max_tokens, stats.summary_count
            )
            .dimmed()
        );
    }

    Ok(())
}

fn spinner(message: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn print_report(report: &AnalysisReport) {
    println!();
    if let Some(repo) = &report.repository {
        println!("{} {}", "📦".bold(), repo.full_name().bold());
        if let Some(description) = &repo.description {
            println!("   {}", description.dimmed());
        }
        let languages: Vec<String> = repo
            .language_breakdown()
            .iter()
            .take(5)
            .map(|(lang, pct)| format!("{} {:.1}%", lang, pct))
            .collect();
        if !languages.is_empty() {
            println!("   {}", languages.join(" · "));
        }
        println!(
            "   ⭐ {}  🍴 {}  📄 {} files analyzed",
            repo.stars,
            repo.forks,
            repo.files_analyzed.len()
        );
        if !repo.security_files.is_empty() {
            println!("   🔒 {}", repo.security_files.join(", ").yellow());
        }
    }

    println!("\n{}", "─────────────────────────────────────".dimmed());
    if let Some(summary) = &report.summary {
        println!("{}", summary);
    }
    println!("{}", "─────────────────────────────────────".dimmed());

    if !report.recommendations.is_empty() {
        println!("\n{}", "Recommendations".green().bold());
        for (i, item) in report.recommendations.iter().enumerate() {
            println!("  {}. {}", i + 1, item);
        }
    }

    let context = &report.context;
    println!(
        "\n{}",
        format!(
            "{} analysis · {:.1}s · {} / {} tokens ({:.0}%) · {} summaries",
            report.analysis_type,
            report.processing_time_ms as f64 / 1000.0,
            context.current_tokens,
            context.max_tokens,
            context.usage_ratio() * 100.0,
            context.summary_count
        )
        .dimmed()
    );
}
