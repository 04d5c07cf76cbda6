//! OpenPasture command implementations

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::info;

use openpasture_config::{self as config, Config};
use openpasture_engine::DailyPlanner;
use openpasture_provider::{OpenRouterProvider, Provider};
use openpasture_store::{FarmSettings, FileStore, PlanRead, SettingsRead};

fn parse_date(date: Option<String>) -> Result<NaiveDate> {
    match date {
        Some(text) => text
            .parse()
            .with_context(|| format!("invalid date '{text}', expected YYYY-MM-DD")),
        None => Ok(Local::now().date_naive()),
    }
}

/// Settings for the run: the farm document wins, config defaults fill in.
async fn resolve_settings(store: &FileStore, farm: &str, config: &Config) -> Result<FarmSettings> {
    let settings = store.farm_settings(farm).await?;
    Ok(settings.unwrap_or(FarmSettings {
        min_ndvi_threshold: config.farm.min_ndvi_threshold,
        min_rest_period_days: config.farm.min_rest_period_days,
        default_section_pct: config.farm.default_section_pct,
    }))
}

/// Initialize config and the farm data directory
pub async fn init_command() -> Result<()> {
    let cfg = config::init().await?;
    println!("✓ Config at {}", config::config_path().display());
    println!("✓ Farm documents in {}", cfg.farms_dir().display());
    if !cfg.has_api_key() {
        println!("  Add your provider API key to the config before running plans.");
    }
    Ok(())
}

/// Generate the daily plan for one farm
pub async fn run_command(
    farm: String,
    name: Option<String>,
    paddock: Option<String>,
    date: Option<String>,
) -> Result<()> {
    let cfg = Config::load().await?;
    let api_key = cfg
        .api_key()
        .context("no API key configured; run `openpasture init` and edit the config")?;
    let date = parse_date(date)?;

    let provider = OpenRouterProvider::new(api_key, cfg.api_base(), Some(cfg.default_model()));
    let store = FileStore::new(cfg.farms_dir());
    let settings = resolve_settings(&store, &farm, &cfg).await?;
    let farm_name = name.unwrap_or_else(|| farm.clone());

    info!(farm = %farm, date = %date, "generating daily plan");
    let outcome = DailyPlanner::new(&store, &provider, cfg.default_model())
        .with_date(date)
        .run_daily_plan(&farm, &farm_name, paddock.as_deref(), settings)
        .await?;

    if outcome.plan_created {
        let plan_id = outcome.plan_id.as_deref().unwrap_or("-");
        if outcome.plan_finalized {
            println!("✓ Plan {plan_id} created and submitted for review");
        } else {
            println!("! Plan {plan_id} drafted but not finalized");
        }
    } else {
        println!("✗ No plan was created; try again or check the logs");
    }
    Ok(())
}

/// Print the plan recorded for a farm and date
pub async fn show_command(farm: String, date: Option<String>) -> Result<()> {
    let cfg = Config::load().await?;
    let store = FileStore::new(cfg.farms_dir());
    let date = parse_date(date)?;

    match store.plan_for_date(&farm, date).await? {
        None => println!("No plan recorded for {farm} on {date}"),
        Some(plan) => {
            println!("Plan {} — {} — {:?}", plan.id, plan.date, plan.status);
            println!("  Target paddock: {}", plan.target_paddock_id);
            println!("  Confidence: {:.2}", plan.confidence);
            for reason in &plan.reasoning {
                println!("  - {reason}");
            }
            if let Some(section) = &plan.section {
                println!(
                    "  Section: {:.2} ha, centroid [{:.5}, {:.5}]",
                    section.area_ha, section.centroid[0], section.centroid[1]
                );
                println!("  Justification: {}", section.justification);
                println!("  Geometry: {}", section.geometry.to_json_value());
            }
        }
    }
    Ok(())
}

/// Show configuration and provider readiness
pub async fn status_command() -> Result<()> {
    let cfg = Config::load().await?;

    println!("OpenPasture status");
    println!("──────────────────");
    println!("Config:     {}", config::config_path().display());
    println!("Farms dir:  {}", cfg.farms_dir().display());
    println!("Model:      {}", cfg.default_model());
    println!(
        "API key:    {}",
        if cfg.has_api_key() { "[set]" } else { "[not set]" }
    );

    let provider = OpenRouterProvider::new(
        cfg.api_key().unwrap_or_default(),
        cfg.api_base(),
        Some(cfg.default_model()),
    );
    println!(
        "Provider:   {}",
        if provider.is_configured() {
            "ready"
        } else {
            "not configured"
        }
    );

    let farms_dir = cfg.farms_dir();
    if farms_dir.exists() {
        let mut farms: Vec<String> = std::fs::read_dir(&farms_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(|s| s.to_string())
            })
            .collect();
        farms.sort();
        if farms.is_empty() {
            println!("Farms:      none");
        } else {
            println!("Farms:      {}", farms.join(", "));
        }
    } else {
        println!("Farms:      (directory missing, run `openpasture init`)");
    }
    Ok(())
}
