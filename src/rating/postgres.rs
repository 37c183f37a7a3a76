use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::str::FromStr;
use tracing::{debug, instrument, warn};

use super::{
    Game, GameId, GameResult, NewHistoryEvent, NewRating, Player, PlayerId, Rating, RatingError,
    RatingHistoryEvent, RatingId, RatingModel, RatingStore, Team,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS players (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS games (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        rating_model TEXT NOT NULL,
        min_number_of_teams INTEGER NOT NULL DEFAULT 2,
        max_number_of_teams INTEGER,
        min_number_of_players_per_team INTEGER NOT NULL DEFAULT 1,
        max_number_of_players_per_team INTEGER,
        allow_ties BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS results (
        id BIGSERIAL PRIMARY KEY,
        game_id BIGINT NOT NULL REFERENCES games(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS teams (
        id BIGSERIAL PRIMARY KEY,
        result_id BIGINT NOT NULL REFERENCES results(id) ON DELETE CASCADE,
        rank INTEGER NOT NULL,
        score DOUBLE PRECISION
    )",
    "CREATE TABLE IF NOT EXISTS memberships (
        team_id BIGINT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
        player_id BIGINT NOT NULL REFERENCES players(id),
        PRIMARY KEY (team_id, player_id)
    )",
    "CREATE TABLE IF NOT EXISTS ratings (
        id BIGSERIAL PRIMARY KEY,
        player_id BIGINT NOT NULL REFERENCES players(id),
        game_id BIGINT NOT NULL REFERENCES games(id),
        value INTEGER NOT NULL,
        mean DOUBLE PRECISION NOT NULL,
        deviation DOUBLE PRECISION NOT NULL,
        UNIQUE (player_id, game_id)
    )",
    "CREATE TABLE IF NOT EXISTS rating_history_events (
        id BIGSERIAL PRIMARY KEY,
        rating_id BIGINT NOT NULL REFERENCES ratings(id) ON DELETE CASCADE,
        value INTEGER NOT NULL,
        mean DOUBLE PRECISION,
        deviation DOUBLE PRECISION,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS rating_history_events_rating_idx
        ON rating_history_events (rating_id, created_at)",
];

const RATING_COLUMNS: &str = "id, player_id, game_id, value, mean, deviation";
const HISTORY_COLUMNS: &str = "id, rating_id, value, mean, deviation, created_at";

/// PostgreSQL implementation of the rating store
pub struct PostgresRatingStore {
    pool: PgPool,
}

impl PostgresRatingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables the engine reads and writes when they are missing.
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<(), RatingError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    warn!(error = %e, "Failed to create rating schema");
                    RatingError::from(e)
                })?;
        }
        debug!("Rating schema ready");
        Ok(())
    }
}

fn count(row: &PgRow, column: &str) -> Result<u32, RatingError> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| RatingError::Store(format!("negative {column}: {value}")))
}

fn optional_count(row: &PgRow, column: &str) -> Result<Option<u32>, RatingError> {
    let value: Option<i32> = row.try_get(column)?;
    value
        .map(|v| {
            u32::try_from(v).map_err(|_| RatingError::Store(format!("negative {column}: {v}")))
        })
        .transpose()
}

fn game_from_row(row: &PgRow) -> Result<Game, RatingError> {
    let model: String = row.try_get("rating_model")?;
    let rating_model = RatingModel::from_str(&model)
        .map_err(|_| RatingError::Store(format!("unknown rating model '{model}'")))?;

    Ok(Game {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        rating_model,
        min_teams: count(row, "min_number_of_teams")?,
        max_teams: optional_count(row, "max_number_of_teams")?,
        min_players_per_team: count(row, "min_number_of_players_per_team")?,
        max_players_per_team: optional_count(row, "max_number_of_players_per_team")?,
        allow_ties: row.try_get("allow_ties")?,
    })
}

fn rating_from_row(row: &PgRow) -> Result<Rating, RatingError> {
    Ok(Rating {
        id: row.try_get("id")?,
        player_id: row.try_get("player_id")?,
        game_id: row.try_get("game_id")?,
        value: row.try_get("value")?,
        mean: row.try_get("mean")?,
        deviation: row.try_get("deviation")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<RatingHistoryEvent, RatingError> {
    Ok(RatingHistoryEvent {
        id: row.try_get("id")?,
        rating_id: row.try_get("rating_id")?,
        value: row.try_get("value")?,
        mean: row.try_get("mean")?,
        deviation: row.try_get("deviation")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Folds flat result/team/player rows, ordered by result then team, into
/// results with nested teams.
fn results_from_rows(rows: &[PgRow]) -> Result<Vec<GameResult>, RatingError> {
    let mut results: Vec<GameResult> = Vec::new();
    let mut current_team: Option<i64> = None;

    for row in rows {
        let result_id: i64 = row.try_get("result_id")?;
        if results.last().map(|r| r.id) != Some(result_id) {
            results.push(GameResult {
                id: result_id,
                game_id: row.try_get("game_id")?,
                created_at: row.try_get("created_at")?,
                teams: Vec::new(),
            });
            current_team = None;
        }
        let Some(result) = results.last_mut() else {
            continue;
        };

        let team_id: Option<i64> = row.try_get("team_id")?;
        let Some(team_id) = team_id else {
            continue;
        };
        if current_team != Some(team_id) {
            let rank: i32 = row.try_get("rank")?;
            let rank = u32::try_from(rank)
                .map_err(|_| RatingError::Store(format!("negative rank in team {team_id}")))?;
            let mut team = Team::new(rank, Vec::new());
            team.score = row.try_get("score")?;
            result.teams.push(team);
            current_team = Some(team_id);
        }

        let player_id: Option<PlayerId> = row.try_get("player_id")?;
        if let (Some(player_id), Some(team)) = (player_id, result.teams.last_mut()) {
            let name: Option<String> = row.try_get("player_name")?;
            team.players.push(Player::new(player_id, name.unwrap_or_default()));
        }
    }

    Ok(results)
}

#[async_trait]
impl RatingStore for PostgresRatingStore {
    #[instrument(skip(self))]
    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>, RatingError> {
        let row = sqlx::query(
            "SELECT id, name, rating_model, min_number_of_teams, max_number_of_teams, \
             min_number_of_players_per_team, max_number_of_players_per_team, allow_ties \
             FROM games WHERE id = $1",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, game_id, "Failed to fetch game from database");
            RatingError::from(e)
        })?;

        row.as_ref().map(game_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn results_for_game(&self, game_id: GameId) -> Result<Vec<GameResult>, RatingError> {
        let rows = sqlx::query(
            "SELECT r.id AS result_id, r.game_id, r.created_at, \
                    t.id AS team_id, t.rank, t.score, \
                    p.id AS player_id, p.name AS player_name \
             FROM results r \
             LEFT JOIN teams t ON t.result_id = r.id \
             LEFT JOIN memberships m ON m.team_id = t.id \
             LEFT JOIN players p ON p.id = m.player_id \
             WHERE r.game_id = $1 \
             ORDER BY r.created_at, r.id, t.id, p.id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, game_id, "Failed to fetch results from database");
            RatingError::from(e)
        })?;

        let results = results_from_rows(&rows)?;
        debug!(game_id, results = results.len(), "Loaded results");
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn ratings_for_game(&self, game_id: GameId) -> Result<Vec<Rating>, RatingError> {
        let rows = sqlx::query(&format!(
            "SELECT {RATING_COLUMNS} FROM ratings WHERE game_id = $1 ORDER BY player_id"
        ))
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, game_id, "Failed to fetch ratings from database");
            RatingError::from(e)
        })?;

        rows.iter().map(rating_from_row).collect()
    }

    #[instrument(skip(self, player_ids), fields(players = player_ids.len()))]
    async fn ratings_for_players(
        &self,
        game_id: GameId,
        player_ids: &[PlayerId],
    ) -> Result<Vec<Rating>, RatingError> {
        let rows = sqlx::query(&format!(
            "SELECT {RATING_COLUMNS} FROM ratings \
             WHERE game_id = $1 AND player_id = ANY($2) ORDER BY player_id"
        ))
        .bind(game_id)
        .bind(player_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, game_id, "Failed to fetch player ratings from database");
            RatingError::from(e)
        })?;

        rows.iter().map(rating_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn ratings_for_player(&self, player_id: PlayerId) -> Result<Vec<Rating>, RatingError> {
        let rows = sqlx::query(&format!(
            "SELECT {RATING_COLUMNS} FROM ratings WHERE player_id = $1 \
             ORDER BY value DESC, game_id"
        ))
        .bind(player_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, player_id, "Failed to fetch ratings of player from database");
            RatingError::from(e)
        })?;

        rows.iter().map(rating_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn find_rating(
        &self,
        player_id: PlayerId,
        game_id: GameId,
    ) -> Result<Option<Rating>, RatingError> {
        let row = sqlx::query(&format!(
            "SELECT {RATING_COLUMNS} FROM ratings WHERE player_id = $1 AND game_id = $2"
        ))
        .bind(player_id)
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, player_id, game_id, "Failed to fetch rating from database");
            RatingError::from(e)
        })?;

        row.as_ref().map(rating_from_row).transpose()
    }

    #[instrument(
        skip(self, rating),
        fields(player_id = rating.player_id, game_id = rating.game_id)
    )]
    async fn insert_rating(&self, rating: &NewRating) -> Result<Rating, RatingError> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO ratings (player_id, game_id, value, mean, deviation) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (player_id, game_id) DO NOTHING \
             RETURNING {RATING_COLUMNS}"
        ))
        .bind(rating.player_id)
        .bind(rating.game_id)
        .bind(rating.value)
        .bind(rating.mean)
        .bind(rating.deviation)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to insert rating into database");
            RatingError::from(e)
        })?;

        if let Some(row) = inserted {
            return rating_from_row(&row);
        }

        debug!("Rating already exists, returning stored row");
        self.find_rating(rating.player_id, rating.game_id)
            .await?
            .ok_or_else(|| {
                RatingError::Store(format!(
                    "rating for player {} in game {} vanished after conflict",
                    rating.player_id, rating.game_id
                ))
            })
    }

    #[instrument(skip(self, rating), fields(rating_id = rating.id))]
    async fn update_rating(&self, rating: &Rating) -> Result<(), RatingError> {
        let result =
            sqlx::query("UPDATE ratings SET value = $2, mean = $3, deviation = $4 WHERE id = $1")
                .bind(rating.id)
                .bind(rating.value)
                .bind(rating.mean)
                .bind(rating.deviation)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    warn!(error = %e, "Failed to update rating in database");
                    RatingError::from(e)
                })?;

        if result.rows_affected() == 0 {
            warn!("Rating not found for update");
            return Err(RatingError::Store(format!("rating {} not found", rating.id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn history_for_rating(
        &self,
        rating_id: RatingId,
    ) -> Result<Vec<RatingHistoryEvent>, RatingError> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM rating_history_events \
             WHERE rating_id = $1 ORDER BY created_at, id"
        ))
        .bind(rating_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, rating_id, "Failed to fetch rating history from database");
            RatingError::from(e)
        })?;

        rows.iter().map(event_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn history_for_game(
        &self,
        game_id: GameId,
    ) -> Result<Vec<RatingHistoryEvent>, RatingError> {
        let rows = sqlx::query(
            "SELECT h.id, h.rating_id, h.value, h.mean, h.deviation, h.created_at \
             FROM rating_history_events h \
             JOIN ratings r ON r.id = h.rating_id \
             WHERE r.game_id = $1 ORDER BY h.created_at, h.id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, game_id, "Failed to fetch game history from database");
            RatingError::from(e)
        })?;

        rows.iter().map(event_from_row).collect()
    }

    #[instrument(skip(self, event), fields(rating_id = event.rating_id))]
    async fn insert_history_event(
        &self,
        event: &NewHistoryEvent,
    ) -> Result<RatingHistoryEvent, RatingError> {
        let row = sqlx::query(&format!(
            "INSERT INTO rating_history_events (rating_id, value, mean, deviation, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {HISTORY_COLUMNS}"
        ))
        .bind(event.rating_id)
        .bind(event.value)
        .bind(event.mean)
        .bind(event.deviation)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to insert rating history event");
            RatingError::from(e)
        })?;

        event_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn delete_history_for_rating(&self, rating_id: RatingId) -> Result<u64, RatingError> {
        let result = sqlx::query("DELETE FROM rating_history_events WHERE rating_id = $1")
            .bind(rating_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, rating_id, "Failed to delete rating history");
                RatingError::from(e)
            })?;

        let deleted = result.rows_affected();
        debug!(rating_id, deleted, "Rating history deleted");
        Ok(deleted)
    }
}
