use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use strum_macros::{AsRefStr, Display, EnumString};

pub type PlayerId = i64;
pub type GameId = i64;
pub type ResultId = i64;
pub type RatingId = i64;

/// Ratings of one game keyed by player, threaded between pipeline stages.
pub type RatingMap = BTreeMap<PlayerId, Rating>;

pub const DEFAULT_RATING_VALUE: i32 = 1000;
pub const DEFAULT_MEAN: f64 = 25.0;
pub const DEFAULT_DEVIATION: f64 = 8.333;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RatingModel {
    Elo,
    TeamRating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub rating_model: RatingModel,
    pub min_teams: u32,
    pub max_teams: Option<u32>,
    pub min_players_per_team: u32,
    pub max_players_per_team: Option<u32>,
    pub allow_ties: bool,
}

impl Game {
    /// One-on-one game: exactly two teams of exactly one player.
    pub fn new_elo(id: GameId, name: impl Into<String>, allow_ties: bool) -> Self {
        Self {
            id,
            name: name.into(),
            rating_model: RatingModel::Elo,
            min_teams: 2,
            max_teams: Some(2),
            min_players_per_team: 1,
            max_players_per_team: Some(1),
            allow_ties,
        }
    }

    /// Team game with at least two teams of at least one player, unbounded above.
    pub fn new_team_rating(id: GameId, name: impl Into<String>, allow_ties: bool) -> Self {
        Self {
            id,
            name: name.into(),
            rating_model: RatingModel::TeamRating,
            min_teams: 2,
            max_teams: None,
            min_players_per_team: 1,
            max_players_per_team: None,
            allow_ties,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    /// 1 is best; equal ranks are ties.
    pub rank: u32,
    pub score: Option<f64>,
    pub players: Vec<Player>,
}

impl Team {
    pub fn new(rank: u32, players: Vec<Player>) -> Self {
        Self {
            rank,
            score: None,
            players,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn player_ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.iter().map(|p| p.id)
    }
}

/// One recorded outcome of a game. Never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub id: ResultId,
    pub game_id: GameId,
    pub created_at: DateTime<Utc>,
    pub teams: Vec<Team>,
}

impl GameResult {
    /// Distinct participants of the result.
    pub fn player_ids(&self) -> BTreeSet<PlayerId> {
        self.teams.iter().flat_map(|t| t.player_ids()).collect()
    }

    /// Teams ordered best rank first; teams sharing a rank keep their recorded order.
    pub fn teams_by_rank(&self) -> Vec<Team> {
        let mut teams = self.teams.clone();
        teams.sort_by_key(|t| t.rank);
        teams
    }

    /// The result with playerless teams removed; borrowed when there are none.
    pub fn without_empty_teams(&self) -> Cow<'_, GameResult> {
        if self.teams.iter().all(|t| !t.players.is_empty()) {
            return Cow::Borrowed(self);
        }
        Cow::Owned(GameResult {
            id: self.id,
            game_id: self.game_id,
            created_at: self.created_at,
            teams: self
                .teams
                .iter()
                .filter(|t| !t.players.is_empty())
                .cloned()
                .collect(),
        })
    }
}

/// A result as submitted, before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGameResult {
    pub game_id: GameId,
    pub created_at: DateTime<Utc>,
    pub teams: Vec<Team>,
}

/// Gaussian skill belief of the team rating model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillBelief {
    pub mean: f64,
    pub deviation: f64,
}

impl Default for SkillBelief {
    fn default() -> Self {
        Self {
            mean: DEFAULT_MEAN,
            deviation: DEFAULT_DEVIATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub id: RatingId,
    pub player_id: PlayerId,
    pub game_id: GameId,
    pub value: i32,
    pub mean: f64,
    pub deviation: f64,
}

impl Rating {
    pub fn belief(&self) -> SkillBelief {
        SkillBelief {
            mean: self.mean,
            deviation: self.deviation,
        }
    }

    pub fn reset_to_default(&mut self) {
        self.value = DEFAULT_RATING_VALUE;
        self.mean = DEFAULT_MEAN;
        self.deviation = DEFAULT_DEVIATION;
    }

    pub fn apply(&mut self, update: &RatingUpdate) {
        self.value = update.value;
        if let Some(belief) = update.belief {
            self.mean = belief.mean;
            self.deviation = belief.deviation;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRating {
    pub player_id: PlayerId,
    pub game_id: GameId,
    pub value: i32,
    pub mean: f64,
    pub deviation: f64,
}

impl NewRating {
    pub fn default_for(player_id: PlayerId, game_id: GameId) -> Self {
        Self {
            player_id,
            game_id,
            value: DEFAULT_RATING_VALUE,
            mean: DEFAULT_MEAN,
            deviation: DEFAULT_DEVIATION,
        }
    }
}

/// New state of one rating after a result. `belief` is only set by the team model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub value: i32,
    pub belief: Option<SkillBelief>,
}

/// Calculator input for one participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorRating {
    pub value: i32,
    pub belief: SkillBelief,
}

impl Default for PriorRating {
    fn default() -> Self {
        Self {
            value: DEFAULT_RATING_VALUE,
            belief: SkillBelief::default(),
        }
    }
}

impl From<&Rating> for PriorRating {
    fn from(rating: &Rating) -> Self {
        Self {
            value: rating.value,
            belief: rating.belief(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingHistoryEvent {
    pub id: i64,
    pub rating_id: RatingId,
    pub value: i32,
    pub mean: Option<f64>,
    pub deviation: Option<f64>,
    /// Timestamp of the result that produced the event.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryEvent {
    pub rating_id: RatingId,
    pub value: i32,
    pub mean: Option<f64>,
    pub deviation: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl NewHistoryEvent {
    pub fn for_rating(rating: &Rating, model: RatingModel, created_at: DateTime<Utc>) -> Self {
        let (mean, deviation) = match model {
            RatingModel::Elo => (None, None),
            RatingModel::TeamRating => (Some(rating.mean), Some(rating.deviation)),
        };
        Self {
            rating_id: rating.id,
            value: rating.value,
            mean,
            deviation,
            created_at,
        }
    }
}
