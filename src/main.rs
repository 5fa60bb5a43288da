//! Gauss CLI
//!
//! 入口：初始化日志、加载配置、对单道题跑一次求解会话并渲染
//! 最终答案 + 逐轮轨迹 + 验证备注。Ctrl-C 通过取消令牌优雅终止。

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use gauss::config::load_config;
use gauss::llm::create_llm_from_config;
use gauss::solve::{ProblemStatement, SessionStatus, SolveLoop, SolveOptions};
use gauss::verify::Verifier;

fn print_usage() {
    println!("Gauss - LLM + CAS math solver");
    println!("{}", "=".repeat(50));
    println!("Usage: gauss [--rounds N] [--structured] [--subject TAG] \"<problem>\"");
    println!();
    println!("Examples:");
    println!("  gauss \"What is sin(30°)?\"");
    println!("  gauss --rounds 5 \"Solve x^2 + 5x + 6 = 0\"");
    println!("  gauss --subject calculus \"Find the derivative of sin(x)cos(x)\"");
    println!();
    println!("Requirements:");
    println!("  - Set GEMINI_API_KEY (or switch provider in config/default.toml)");
}

struct CliArgs {
    problem: String,
    rounds: Option<u32>,
    structured: bool,
    subject: Option<String>,
}

fn parse_args(args: &[String]) -> Option<CliArgs> {
    let mut rounds = None;
    let mut structured = false;
    let mut subject = None;
    let mut rest: Vec<String> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--rounds" => rounds = iter.next().and_then(|v| v.parse().ok()),
            "--structured" => structured = true,
            "--subject" => subject = iter.next().cloned(),
            _ => rest.push(arg.clone()),
        }
    }

    if rest.is_empty() {
        return None;
    }
    Some(CliArgs {
        problem: rest.join(" "),
        rounds,
        structured,
        subject,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gauss::observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(cli) = parse_args(&args) else {
        print_usage();
        std::process::exit(1);
    };

    let cfg = load_config(None).context("Failed to load config")?;
    let oracle = create_llm_from_config(&cfg);

    let mut options = SolveOptions::from_config(&cfg.solver).with_structured(cli.structured);
    if let Some(r) = cli.rounds {
        options.max_rounds = r;
    }

    let solver = SolveLoop::new(oracle, Verifier::from_config(&cfg.solver), options)
        .context("Failed to create solve loop")?;

    let mut problem = ProblemStatement::new(cli.problem.clone());
    if let Some(subject) = cli.subject {
        problem = problem.with_subject(subject);
    }

    // Ctrl-C → 取消令牌；循环在下一个检查点落为 fatal_error
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    println!("Solving: {}", cli.problem);
    println!("{}", "=".repeat(50));

    let session = solver.run_with_cancel(problem, cancel).await;

    println!();
    println!("=== Status ===");
    match session.status() {
        SessionStatus::Solved => println!("solved"),
        SessionStatus::Exhausted => println!("exhausted (final answer unverified)"),
        SessionStatus::FatalError => println!("fatal_error"),
        SessionStatus::Running => println!("running"),
    }

    if let Some(fault) = session.fault() {
        println!("\n=== Fault ===");
        println!("{}", fault);
    }

    println!("\n=== Final Answer ===");
    println!("{}", session.final_answer().unwrap_or("<none>"));

    println!("\n=== Rounds ===");
    for round in session.rounds() {
        println!("{}", "-".repeat(50));
        println!("Round {} @ {}", round.index, round.at.to_rfc3339());
        match &round.candidate {
            Some(c) => println!("Candidate: {}", c.final_answer),
            None => println!("Candidate: <parse failed>"),
        }
        match &round.verdict {
            Some(v) => {
                println!(
                    "Verdict: {} (complexity {})",
                    if v.is_valid { "valid" } else { "invalid" },
                    v.complexity_score
                );
                if let Some(canonical) = &v.canonical_form {
                    println!("Canonical: {}", canonical);
                }
                if let Some(numeric) = &v.numeric_value {
                    println!("Exact value: {}", numeric);
                }
                for note in &v.notes {
                    println!("  - {}", note);
                }
            }
            None => println!("Verdict: <not reached>"),
        }
    }

    println!("{}", "=".repeat(50));

    if session.status() == SessionStatus::FatalError {
        std::process::exit(2);
    }
    Ok(())
}
