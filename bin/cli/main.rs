//! Eligibility CLI
//!
//! Admin client for the eligibility server: read and change the threshold
//! policy, trigger recomputation, and inspect testers and their results.

mod style;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use style::*;
use worker_eligibility::{
    ClientError, Eligibility, EligibilityClient, NewTestResult, RunStatus, ThresholdType,
};

#[derive(Parser)]
#[command(name = "eligibility")]
#[command(about = "Manage worker eligibility thresholds")]
struct Cli {
    /// Eligibility server URL
    #[arg(long, default_value = "http://localhost:8080", env = "ELIGIBILITY_URL")]
    url: String,

    /// API bearer token
    #[arg(long, env = "ELIGIBILITY_TOKEN", hide_env_values = true)]
    token: String,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the threshold policy
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// Recompute every worker's eligibility
    Update,
    /// Show the last eligibility run
    LastRun,
    /// Accuracy and eligibility per tester
    Analysis,
    /// Recorded test results
    Results {
        /// Only this worker's results
        #[arg(long)]
        worker: Option<String>,
    },
    /// Record a test result
    Submit {
        #[arg(long)]
        worker: String,
        #[arg(long)]
        test: String,
        /// Score in [0, 1]
        #[arg(long)]
        score: f64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Register a worker or rename it
    Register { worker: String, name: String },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Current policy and effective threshold
    Get,
    /// Set the policy type (MEDIAN, MEAN, CUSTOM)
    Set {
        #[arg(value_parser = parse_threshold_type)]
        threshold_type: ThresholdType,
        /// Required for CUSTOM, in [0, 1]
        value: Option<f64>,
    },
}

fn parse_threshold_type(raw: &str) -> Result<ThresholdType, String> {
    raw.parse()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<ClientError>() {
            Some(client_err) if client_err.is_retryable() => {
                print_error(&client_err.to_string());
                print_warning("Retry once the current run has finished or the server recovers");
            }
            Some(client_err) => print_error(&client_err.to_string()),
            None => print_error(&format!("{:#}", e)),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = EligibilityClient::new(&cli.url, &cli.token)?;

    match cli.command {
        Commands::Settings { action } => match action.unwrap_or(SettingsAction::Get) {
            SettingsAction::Get => show_settings(&client, cli.json).await,
            SettingsAction::Set {
                threshold_type,
                value,
            } => set_settings(&client, threshold_type, value, cli.json).await,
        },
        Commands::Update => trigger_update(&client, cli.json).await,
        Commands::LastRun => show_last_run(&client, cli.json).await,
        Commands::Analysis => show_analysis(&client, cli.json).await,
        Commands::Results { worker } => show_results(&client, worker.as_deref(), cli.json).await,
        Commands::Submit {
            worker,
            test,
            score,
            name,
            feedback,
        } => {
            let input = NewTestResult {
                worker_id: worker,
                tester_name: name,
                test_id: test,
                score,
                feedback,
            };
            let result = client.submit_test_result(&input).await?;
            if cli.json {
                return print_json(&result);
            }
            print_success(&format!(
                "Recorded {} for {} (score {:.3})",
                result.id, result.worker_id, result.score
            ));
            Ok(())
        }
        Commands::Register { worker, name } => {
            let worker = client.register_worker(&worker, &name).await?;
            if cli.json {
                return print_json(&worker);
            }
            print_success(&format!(
                "Registered {} as {}",
                worker.worker_id, worker.tester_name
            ));
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to encode response")?
    );
    Ok(())
}

async fn show_settings(client: &EligibilityClient, json: bool) -> Result<()> {
    let settings = client.threshold_settings().await?;
    if json {
        return print_json(&settings);
    }

    print_header("Threshold Settings");
    print_key_value("Type", settings.policy.threshold_type.as_str());
    if let Some(value) = settings.policy.value {
        print_key_value("Value", &format!("{:.3}", value));
    }
    print_key_value("Last updated", &settings.policy.last_updated.to_rfc3339());
    match settings.effective_threshold {
        Some(t) => print_key_value_colored("Effective threshold", &format!("{:.3}", t), colors::GREEN),
        None => print_key_value_colored(
            "Effective threshold",
            &format!(
                "unavailable ({} of {} workers needed)",
                settings.population_size, settings.quorum
            ),
            colors::YELLOW,
        ),
    }
    print_key_value("Population", &settings.population_size.to_string());
    println!();
    Ok(())
}

async fn set_settings(
    client: &EligibilityClient,
    threshold_type: ThresholdType,
    value: Option<f64>,
    json: bool,
) -> Result<()> {
    let policy = client.update_threshold_settings(threshold_type, value).await?;
    if json {
        return print_json(&policy);
    }
    let shown = policy
        .value
        .map(|v| format!(" ({:.3})", v))
        .unwrap_or_default();
    print_success(&format!(
        "Threshold policy set to {}{}",
        policy.threshold_type, shown
    ));
    Ok(())
}

async fn trigger_update(client: &EligibilityClient, json: bool) -> Result<()> {
    let summary = client.trigger_update().await?;
    if json {
        return print_json(&summary);
    }

    print_header("Eligibility Update");
    print_key_value("Run", &summary.run_id.to_string());
    print_key_value("Policy", summary.policy.threshold_type.as_str());
    print_key_value("Threshold", &format_ratio(summary.threshold));
    print_key_value_colored("Eligible", &summary.eligible_count.to_string(), colors::GREEN);
    print_key_value_colored(
        "Not eligible",
        &summary.not_eligible_count.to_string(),
        colors::RED,
    );
    print_key_value_colored("Pending", &summary.pending_count.to_string(), colors::YELLOW);
    print_key_value("Digest", &style_dim(&summary.verdict_digest));
    println!();
    Ok(())
}

async fn show_last_run(client: &EligibilityClient, json: bool) -> Result<()> {
    let run = client.latest_run().await?;
    if json {
        return print_json(&run);
    }

    print_header("Last Eligibility Run");
    let color = match run.status {
        RunStatus::Succeeded => colors::GREEN,
        RunStatus::Failed => colors::RED,
        RunStatus::Running => colors::YELLOW,
    };
    print_key_value("Run", &run.id.to_string());
    print_key_value_colored("Status", run.status.as_str(), color);
    print_key_value("Trigger", run.trigger.as_str());
    print_key_value("Started", &run.started_at.to_rfc3339());
    if let Some(finished) = run.finished_at {
        print_key_value("Finished", &finished.to_rfc3339());
    }
    if let Some(error) = &run.error {
        print_key_value_colored("Error", error, colors::RED);
    }
    println!();
    Ok(())
}

async fn show_analysis(client: &EligibilityClient, json: bool) -> Result<()> {
    let rows = client.tester_analysis().await?;
    if json {
        return print_json(&rows);
    }

    print_header("Tester Analysis");
    if rows.is_empty() {
        println!("  {}", style_dim("No workers yet"));
        return Ok(());
    }

    let mut table = new_table(&["Worker", "Tester", "Accuracy", "Scores", "Eligibility"]);
    for row in &rows {
        table.add_row(vec![
            comfy_table::Cell::new(&row.worker_id),
            comfy_table::Cell::new(&row.tester_name),
            comfy_table::Cell::new(format_ratio(row.accuracy)),
            comfy_table::Cell::new(row.score_count),
            eligibility_cell(row.is_eligible),
        ]);
    }
    println!("{}", table);

    let eligible = rows.iter().filter(|r| r.is_eligible == Eligibility::Eligible).count();
    println!();
    println!(
        "  {} of {} testers eligible",
        style_bold(&eligible.to_string()),
        rows.len()
    );
    Ok(())
}

async fn show_results(client: &EligibilityClient, worker: Option<&str>, json: bool) -> Result<()> {
    let rows = client.test_results(worker).await?;
    if json {
        return print_json(&rows);
    }

    print_header("Test Results");
    if rows.is_empty() {
        println!("  {}", style_dim("No results recorded"));
        return Ok(());
    }

    let mut table = new_table(&["Worker", "Test", "Score", "Status", "Feedback", "Recorded"]);
    for row in &rows {
        table.add_row(vec![
            comfy_table::Cell::new(&row.worker_id),
            comfy_table::Cell::new(&row.test_id),
            comfy_table::Cell::new(format!("{:.3}", row.score)),
            eligibility_cell(row.eligibility_status),
            comfy_table::Cell::new(row.feedback.as_deref().unwrap_or("")),
            comfy_table::Cell::new(row.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{}", table);

    if let Some(first) = rows.first() {
        let color = eligibility_color(first.eligibility_status);
        if worker.is_some() {
            print_key_value_colored("Current status", first.eligibility_status.as_str(), color);
        }
    }
    Ok(())
}
