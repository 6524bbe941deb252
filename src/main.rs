use anyhow::Context;
use api_client::connect_broker;
use clap::{Parser, Subcommand};
use comfy_table::Table;
use configuration::{BrokerMode, Config, init_tracing, load_config_from};
use core_types::NewStrategy;
use database::{DbRepository, RejectedRow, connect, run_migrations};
use engine::{IterationReport, TradingEngine};
use std::path::PathBuf;
use std::sync::Arc;

/// Single-instrument automated trading engine for XAUUSD.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides `broker.mode` from the configuration.
    #[arg(long, global = true, value_enum)]
    broker: Option<BrokerMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine loop until Ctrl-C.
    Run,
    /// Run a single iteration and print what each strategy did.
    Once,
    /// Manage trading strategies.
    #[command(subcommand)]
    Strategy(StrategyCommand),
    /// List open positions.
    Positions,
}

#[derive(Subcommand)]
enum StrategyCommand {
    /// Register a strategy from a TOML definition.
    Add {
        #[arg(long)]
        file: PathBuf,
    },
    /// Deactivate a strategy; its open position stays supervised.
    Remove { id: i64 },
    /// List every stored strategy.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = load_config_from(&cli.config).context("failed to load configuration")?;
    if let Some(mode) = cli.broker {
        config.broker.mode = mode;
        config.validate().context("invalid broker override")?;
    }

    let _guards = init_tracing(&config.logging)?;
    let engine = build_engine(&config).await?;

    match cli.command {
        Commands::Run => run(&engine).await,
        Commands::Once => {
            let report = engine.run_iteration().await?;
            print_report(&report);
            Ok(())
        }
        Commands::Strategy(StrategyCommand::Add { file }) => {
            let strategy: NewStrategy = configuration::load_file(&file)
                .with_context(|| format!("failed to read strategy from {}", file.display()))?;
            let created = engine.add_strategy(strategy).await?;
            println!("Added strategy {} ({}) with id {}", created.name, created.symbol, created.id);
            Ok(())
        }
        Commands::Strategy(StrategyCommand::Remove { id }) => {
            engine.remove_strategy(id).await?;
            println!("Strategy {id} deactivated");
            Ok(())
        }
        Commands::Strategy(StrategyCommand::List) => list_strategies(&engine).await,
        Commands::Positions => list_positions(&engine).await,
    }
}

async fn build_engine(config: &Config) -> anyhow::Result<TradingEngine> {
    let pool = connect(&config.database)
        .await
        .with_context(|| format!("failed to open database {}", config.database.url))?;
    run_migrations(&pool).await.context("failed to run database migrations")?;
    let store = Arc::new(DbRepository::new(pool));

    let broker = connect_broker(&config.broker)?;
    tracing::info!(mode = ?config.broker.mode, symbol = %config.engine.symbol, "broker connected");

    Ok(TradingEngine::new(config, broker, store)?)
}

async fn run(engine: &TradingEngine) -> anyhow::Result<()> {
    engine.start().await?;
    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    tracing::info!("shutdown requested");
    engine.stop().await?;
    Ok(())
}

fn print_report(report: &IterationReport) {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Strategy", "Outcome"]);
    for s in &report.strategies {
        table.add_row(vec![s.strategy_id.to_string(), s.name.clone(), s.outcome.to_string()]);
    }
    println!("{table}");

    for closed in &report.sweep.closed {
        println!(
            "Closed {} {} ({}) at {}: pnl {}",
            closed.side, closed.symbol, closed.reason, closed.exit_price, closed.realized_pnl
        );
    }
    if report.sweep.failures > 0 {
        println!("{} open position(s) could not be checked", report.sweep.failures);
    }
}

async fn list_strategies(engine: &TradingEngine) -> anyhow::Result<()> {
    let strategies = engine.list_strategies().await?;
    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Name", "Symbol", "TF", "Mode", "EMA", "RSI", "Lot", "SL %", "TP %", "Max loss", "Active",
    ]);
    for s in strategies.rows {
        let opt = |v: Option<i64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        table.add_row(vec![
            s.id.to_string(),
            s.name,
            s.symbol,
            s.timeframe,
            s.granularity,
            format!("{}/{}", opt(s.fast_ema), opt(s.slow_ema)),
            opt(s.rsi_period),
            s.position_size.to_string(),
            s.stop_loss_percent.to_string(),
            s.take_profit_percent.to_string(),
            s.max_daily_loss.to_string(),
            s.is_active.to_string(),
        ]);
    }
    println!("{table}");
    print_rejected(&strategies.rejected);
    Ok(())
}

fn print_rejected(rejected: &[RejectedRow]) {
    for row in rejected {
        println!("Unreadable row {} ({}): {}", row.id, row.label, row.reason);
    }
}

async fn list_positions(engine: &TradingEngine) -> anyhow::Result<()> {
    let positions = engine.get_active_positions().await?;
    if positions.rows.is_empty() {
        println!("No open positions");
        print_rejected(&positions.rejected);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Position", "Strategy", "Symbol", "Side", "Qty", "Entry", "Stop", "Target", "Opened"]);
    for p in positions.rows {
        table.add_row(vec![
            p.id.to_string(),
            p.strategy_id.to_string(),
            p.symbol,
            p.side.to_string(),
            p.quantity.to_string(),
            p.entry_price.to_string(),
            p.stop_loss.to_string(),
            p.take_profit.to_string(),
            p.entry_time.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    println!("{table}");
    print_rejected(&positions.rejected);
    Ok(())
}
