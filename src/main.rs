use clap::{Parser, Subcommand};
use elovation::{EngineConfig, PostgresRatingStore, RatingError, RatingService};
use serde::Serialize;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Elovation rating maintenance.
///
/// Rebuilds and inspects the ratings stored in PostgreSQL.
#[derive(Debug, Parser)]
#[command(name = "elovation")]
struct Cli {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Overrides ELO_K_FACTOR for this run.
    #[arg(long)]
    k_factor: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Subcommand)]
enum Command {
    /// Wipe a game's history and replay all of its results.
    Recalculate { game_id: i64 },
    /// Report whether a game's ratings disagree with its history.
    Check { game_id: i64 },
    /// Ratings of a game, best first.
    Leaderboard { game_id: i64 },
    /// Per-day rating values of a game.
    Timeline { game_id: i64 },
    /// Ratings of one player across all games, best first.
    Player { player_id: i64 },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => error!(error = %e, "Failed to encode output"),
    }
}

async fn run(command: Command, service: &RatingService) -> Result<(), RatingError> {
    match command {
        Command::Recalculate { game_id } => print_json(&service.recalculate_game(game_id).await?),
        Command::Check { game_id } => {
            let stale = service.needs_recalculation(game_id).await?;
            print_json(&serde_json::json!({
                "game_id": game_id,
                "needs_recalculation": stale,
            }));
        }
        Command::Leaderboard { game_id } => print_json(&service.leaderboard(game_id).await?),
        Command::Timeline { game_id } => print_json(&service.rating_timeline(game_id).await?),
        Command::Player { player_id } => print_json(&service.player_ratings(player_id).await?),
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elovation=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    if let Some(k_factor) = cli.k_factor {
        config.k_factor = k_factor;
    }

    let pool = match sqlx::PgPool::connect(&cli.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(PostgresRatingStore::new(pool));
    if let Err(e) = store.ensure_schema().await {
        error!(error = %e, "Failed to prepare database schema");
        return ExitCode::FAILURE;
    }

    let service = RatingService::builder(store).with_config(&config).build();
    info!(command = ?cli.command, k_factor = config.k_factor, "Running maintenance command");

    match run(cli.command, &service).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            print_json(&e);
            ExitCode::FAILURE
        }
    }
}
