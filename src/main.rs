use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recipe_reconciler::costing::CostEngine;
use recipe_reconciler::reconcile_config::{ReconcileConfig, Thresholds};
use recipe_reconciler::reports::{
    audit_lines, check_specification, recipe_report, specification_report, CrossCheckReport,
};
use recipe_reconciler::snapshot::ReconcileSnapshot;

const ENV_SNAPSHOT: &str = "RECONCILE_SNAPSHOT";
const ENV_MODE: &str = "RECONCILE_MODE";
const ENV_SPECIFICATION_ID: &str = "RECONCILE_SPECIFICATION_ID";
const ENV_TODAY: &str = "RECONCILE_TODAY";
const ENV_LOG_JSON: &str = "RECONCILE_LOG_JSON";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Cross,
    Recipe,
    Specification,
}

impl Mode {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "" | "cross" => Ok(Mode::Cross),
            "recipe" => Ok(Mode::Recipe),
            "specification" | "spec" => Ok(Mode::Specification),
            other => bail!("Unknown {ENV_MODE} '{other}' (expected cross, recipe or specification)"),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var(ENV_LOG_JSON)
        .map(|v| matches!(v.trim(), "1" | "true"))
        .unwrap_or(false);

    // Reports go to stdout, logs to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn reference_date() -> Result<NaiveDate> {
    match env::var(ENV_TODAY) {
        Ok(raw) => raw
            .trim()
            .parse::<NaiveDate>()
            .with_context(|| format!("{ENV_TODAY} must be an ISO date, got '{raw}'")),
        Err(_) => Ok(Local::now().date_naive()),
    }
}

/// One worker per specification, merged in specification-id order
async fn run_cross_check(
    snapshot: Arc<ReconcileSnapshot>,
    engine: Arc<CostEngine>,
    thresholds: Thresholds,
) -> Result<CrossCheckReport> {
    let audit = {
        let snapshot = Arc::clone(&snapshot);
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || audit_lines(&engine, &snapshot.recipes))
    };

    let workers: Vec<_> = snapshot
        .specifications_by_id()
        .into_iter()
        .cloned()
        .map(|spec| {
            let snapshot = Arc::clone(&snapshot);
            let engine = Arc::clone(&engine);
            let thresholds = thresholds;
            tokio::task::spawn_blocking(move || {
                let rules = snapshot.rules_for(spec.id);
                check_specification(&engine, &thresholds, &spec, &rules, &snapshot.recipes)
            })
        })
        .collect();

    let audit = audit.await.context("Line audit worker failed")?;
    let mut passes = Vec::with_capacity(workers.len());
    for worker in workers {
        passes.push(worker.await.context("Specification worker failed")?);
    }

    Ok(CrossCheckReport::assemble(
        engine.prices().today(),
        thresholds,
        &snapshot.recipes,
        audit,
        passes,
    ))
}

fn print_report<T: Serialize>(report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_logging();

    info!("Starting recipe reconciler");

    let snapshot_path = env::var(ENV_SNAPSHOT).with_context(|| format!("{ENV_SNAPSHOT} must be set"))?;
    let mode = Mode::parse(&env::var(ENV_MODE).unwrap_or_default())?;
    let today = reference_date()?;
    let config = ReconcileConfig::from_env();

    info!(
        snapshot = %snapshot_path,
        mode = ?mode,
        reference_date = %today,
        threshold_percent = config.thresholds.percent,
        recipe_threshold_percent = config.recipe_thresholds.percent,
        min_absolute = config.thresholds.min_absolute,
        "Configuration loaded"
    );

    let snapshot = ReconcileSnapshot::load(&snapshot_path)?;
    let engine = snapshot
        .build_engine(&config, today)
        .context("Failed to build cost engine")?;
    let thresholds = config.thresholds;

    let has_issues = match mode {
        Mode::Cross => {
            let report = run_cross_check(Arc::new(snapshot), Arc::new(engine), thresholds).await?;
            print_report(&report)?;
            report.has_issues()
        }
        Mode::Recipe => {
            let report = recipe_report(&engine, &config.recipe_thresholds, &snapshot.recipes);
            print_report(&report)?;
            report.has_issues()
        }
        Mode::Specification => {
            let raw = env::var(ENV_SPECIFICATION_ID)
                .with_context(|| format!("{ENV_SPECIFICATION_ID} must be set in specification mode"))?;
            let specification_id: i64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_SPECIFICATION_ID} must be an integer, got '{raw}'"))?;
            let report = specification_report(
                &engine,
                &thresholds,
                specification_id,
                &snapshot.specifications,
                &snapshot.rules,
                &snapshot.recipes,
            )?;
            print_report(&report)?;
            report.has_issues()
        }
    };

    info!(has_issues, "Reconciliation finished");

    Ok(if has_issues {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
