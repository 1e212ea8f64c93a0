//! pms-runner: headless command runner for the performance-management core.
//!
//! Usage:
//!   pms-runner --db pms.db --data-dir ./data migrate
//!   pms-runner --db pms.db seed-products
//!   pms-runner --db pms.db import-baseline june.csv --period 2025-H1 --date 2025-06-30
//!   pms-runner --db pms.db activate-baseline --period 2025-H1
//!   pms-runner --db pms.db reconcile cbs.csv --branch BR-001 --date 2025-12-05
//!   pms-runner --db pms.db score --staff S-100 --period 2025-H2
//!   pms-runner --db pms.db finalize --staff S-100 --period 2025-H2
//!
//! Output is pretty-printed JSON on stdout. Failures print `{kind, message}`
//! and exit with status 1.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use pms_core::{
    category::KpiCategory, config::PmsConfig, engine::PmsEngine, error::PmsError,
    position::Actor, store::PmsStore,
};
use serde::Serialize;
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;

const COMMANDS: &[&str] = &[
    "migrate",
    "seed-products",
    "import-baseline",
    "activate-baseline",
    "reconcile",
    "score",
    "finalize",
];

#[derive(serde::Deserialize)]
struct ProductSeed {
    product_name: String,
    kpi_category: KpiCategory,
    #[serde(default = "default_true")]
    active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
struct SeedSummary {
    seeded: usize,
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    match run(&args) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let failure = match err.downcast_ref::<PmsError>() {
                Some(pms) => serde_json::json!(pms.to_failure()),
                None => serde_json::json!({ "kind": "internal_error", "message": format!("{err:#}") }),
            };
            println!("{}", serde_json::to_string_pretty(&failure).unwrap_or_else(|_| failure.to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<String> {
    let db = flag(args, "--db").unwrap_or("pms.db");
    let data_dir = flag(args, "--data-dir").unwrap_or("./data");
    let (command, positional) = command(args)?;
    log::info!("pms-runner {command} (db: {db}, data_dir: {data_dir})");

    let uri = if db == ":memory:" { "file:pms_runner?mode=memory&cache=shared" } else { db };
    let store = PmsStore::open(uri)?;
    store.migrate()?;
    let config = PmsConfig::load(data_dir).unwrap_or_else(|e| {
        log::warn!("using default configuration: {e}");
        PmsConfig::default()
    });
    let engine = PmsEngine::build(store, config);
    let actor = Actor::system();

    match command {
        "migrate" => to_json(&serde_json::json!({ "migrated": db })),
        "seed-products" => {
            let path = format!("{data_dir}/products/product_mapping.json");
            let file = File::open(&path).with_context(|| format!("cannot open {path}"))?;
            let seeds: Vec<ProductSeed> = serde_json::from_reader(BufReader::new(file))?;
            for seed in &seeds {
                engine.upsert_product_mapping(&actor, &seed.product_name, seed.kpi_category, seed.active)?;
            }
            to_json(&SeedSummary { seeded: seeds.len() })
        }
        "import-baseline" => {
            let csv_path = positional.ok_or_else(|| anyhow!("import-baseline needs a CSV path"))?;
            let period = required(args, "--period")?;
            let date = date_flag(args, "--date")?;
            let file = File::open(csv_path).with_context(|| format!("cannot open {csv_path}"))?;
            let report = engine.import_baseline_csv(&actor, period, date, BufReader::new(file))?;
            to_json(&report)
        }
        "activate-baseline" => {
            let period = required(args, "--period")?;
            let activated = engine.activate_baseline_period(&actor, period)?;
            to_json(&serde_json::json!({ "period": period, "activated_rows": activated }))
        }
        "reconcile" => {
            let csv_path = positional.ok_or_else(|| anyhow!("reconcile needs a CSV path"))?;
            let branch = required(args, "--branch")?;
            let date = date_flag(args, "--date")?;
            let file = File::open(csv_path).with_context(|| format!("cannot open {csv_path}"))?;
            let file_name = std::path::Path::new(csv_path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(csv_path);
            let validation = engine.reconcile_csv(&actor, branch, date, file_name, BufReader::new(file))?;
            to_json(&validation)
        }
        "score" => {
            let staff = required(args, "--staff")?;
            let period = required(args, "--period")?;
            to_json(&engine.score(staff, period)?)
        }
        "finalize" => {
            let staff = required(args, "--staff")?;
            let period = required(args, "--period")?;
            to_json(&engine.finalize(&actor, staff, period)?)
        }
        other => Err(anyhow!("unknown command '{other}'")),
    }
}

/// The command and the positional argument right after it, if any.
fn command(args: &[String]) -> Result<(&str, Option<&str>)> {
    let idx = args
        .iter()
        .position(|a| COMMANDS.contains(&a.as_str()))
        .ok_or_else(|| anyhow!("expected one of: {}", COMMANDS.join(", ")))?;
    let positional = args
        .get(idx + 1)
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"));
    Ok((args[idx].as_str(), positional))
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == name).map(|w| w[1].as_str())
}

fn required<'a>(args: &'a [String], name: &str) -> Result<&'a str> {
    flag(args, name).ok_or_else(|| anyhow!("missing {name}"))
}

fn date_flag(args: &[String], name: &str) -> Result<NaiveDate> {
    let raw = required(args, name)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("{name} must be YYYY-MM-DD, got '{raw}'"))
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
