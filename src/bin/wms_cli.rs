use std::{fs, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use stateset_wms::{
    config::{self, WmsConfig},
    external::{BinDirectory, StockLevel},
    models::{Bin, BinCoordinates, BinStatusChange, TaskLine, ZoneType},
    reconciliation::count_variance,
    InMemoryWms,
};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Route(args) => handle_route_command(args, cli.json).await?,
        Commands::Variance(args) => handle_variance_command(args, cli.json)?,
        Commands::Config(args) => handle_config_command(args, cli.json)?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "wms-cli", about = "Warehouse floor tooling: routes, variances and configuration", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the serpentine pick route for a set of lines
    Route(RouteArgs),
    /// Classify a count variance
    Variance(VarianceArgs),
    /// Load and print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct RouteArgs {
    #[arg(long, help = "JSON array of bins: {warehouse, aisle, rack, shelf, level, zone_type, blocked}")]
    bins: PathBuf,
    #[arg(long, help = "JSON array of pick lines: {item_code, qty, bin}")]
    lines: PathBuf,
    #[arg(long, help = "Optional JSON array of stock levels used to resolve unbound lines")]
    stock: Option<PathBuf>,
    #[arg(long, help = "Warehouse to route in; defaults to the first bin's warehouse")]
    warehouse: Option<String>,
}

#[derive(Args)]
struct VarianceArgs {
    #[arg(long, value_parser = parse_decimal, help = "Book quantity")]
    book: Decimal,
    #[arg(long, value_parser = parse_decimal, help = "Counted quantity")]
    counted: Decimal,
    #[arg(long, value_parser = parse_decimal, default_value = "0", help = "Valuation rate per unit")]
    rate: Decimal,
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, help = "Configuration directory (defaults to ./config)")]
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct BinRow {
    warehouse: String,
    aisle: String,
    #[serde(default)]
    rack: String,
    #[serde(default)]
    shelf: String,
    #[serde(default)]
    level: String,
    #[serde(default = "default_zone")]
    zone_type: ZoneType,
    #[serde(default)]
    blocked: bool,
}

fn default_zone() -> ZoneType {
    ZoneType::Picking
}

#[derive(Debug, Deserialize)]
struct LineRow {
    item_code: String,
    qty: Decimal,
    #[serde(default)]
    bin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StockRow {
    item_code: String,
    warehouse: String,
    actual_qty: Decimal,
    #[serde(default)]
    reserved_qty: Decimal,
}

#[derive(Serialize)]
struct VarianceOutput {
    book: Decimal,
    counted: Decimal,
    rate: Decimal,
    variance_qty: Decimal,
    variance_pct: Decimal,
    variance_value: Decimal,
    class: String,
    severity: String,
}

async fn handle_route_command(args: RouteArgs, json: bool) -> Result<()> {
    let cfg = WmsConfig::default();
    config::init_tracing(&cfg.log_level, cfg.log_json);

    let bins: Vec<BinRow> = read_json(&args.bins)?;
    let lines: Vec<LineRow> = read_json(&args.lines)?;
    let warehouse = match args.warehouse {
        Some(warehouse) => warehouse,
        None => bins
            .first()
            .map(|b| b.warehouse.clone())
            .ok_or_else(|| anyhow!("--warehouse is required when no bins are given"))?,
    };

    let wms = InMemoryWms::new(cfg);
    for row in bins {
        let coordinates = BinCoordinates::new(row.aisle, row.rack, row.shelf, row.level);
        let bin = Bin::new(row.warehouse, coordinates, row.zone_type)
            .context("invalid bin definition")?;
        let code = bin.code.clone();
        wms.bins.insert(bin);
        if row.blocked {
            wms.bins
                .set_status(&code, BinStatusChange::Block)
                .await
                .with_context(|| format!("failed to block bin {}", code))?;
        }
    }
    if let Some(path) = args.stock {
        let stock: Vec<StockRow> = read_json(&path)?;
        for level in stock {
            wms.availability.set_stock(
                &level.item_code,
                &level.warehouse,
                StockLevel::new(level.actual_qty, level.reserved_qty),
            );
        }
    }

    let task_lines: Vec<TaskLine> = lines
        .into_iter()
        .map(|row| {
            let line = TaskLine::new(row.item_code, row.qty);
            match row.bin {
                Some(bin) => line.with_source_bin(bin),
                None => line,
            }
        })
        .collect();
    debug!(lines = task_lines.len(), %warehouse, "Computing route");

    let route = wms
        .context
        .route_optimizer()
        .compute(&warehouse, &task_lines)
        .await
        .context("failed to compute route")?;

    if json {
        print_json(&route)?;
    } else {
        println!("Route for {} ({} stops)", warehouse, route.sequence.len());
        for stop in &route.sequence {
            println!(
                "{:>4}  {:<16} {:<20} {}",
                stop.pick_sequence, stop.bin, stop.item_code, stop.qty
            );
        }
        for line in &route.unresolved {
            println!("   -  {:<16} {:<20} {}", "unresolved", line.item_code, line.error_message);
        }
    }
    Ok(())
}

fn handle_variance_command(args: VarianceArgs, json: bool) -> Result<()> {
    let variance = count_variance(args.book, args.counted, args.rate);
    let output = VarianceOutput {
        book: args.book,
        counted: args.counted,
        rate: args.rate,
        variance_qty: variance.variance_qty,
        variance_pct: variance.variance_pct,
        variance_value: variance.variance_value,
        class: variance.class.to_string(),
        severity: variance.severity.to_string(),
    };

    if json {
        print_json(&output)?;
    } else {
        println!(
            "{} (severity {}): qty {}, {}%, value {}",
            output.class,
            output.severity,
            output.variance_qty,
            output.variance_pct,
            output.variance_value
        );
    }
    Ok(())
}

fn handle_config_command(args: ConfigArgs, json: bool) -> Result<()> {
    let cfg = match args.dir {
        Some(dir) => config::load_config_from(&dir),
        None => config::load_config(),
    }
    .context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    if json {
        print_json(&cfg)?;
    } else {
        println!("environment             {}", cfg.environment);
        println!("log_level               {}", cfg.log_level);
        println!("log_json                {}", cfg.log_json);
        println!("ledger_timeout_ms       {}", cfg.ledger_timeout_ms);
        println!("availability_timeout_ms {}", cfg.availability_timeout_ms);
        println!("event_channel_capacity  {}", cfg.event_channel_capacity);
        println!("lock_mode               {}", cfg.lock_mode);
        println!("auto_route_wave_tasks   {}", cfg.auto_route_wave_tasks);
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid decimal '{}': {}", raw, e))
}
