#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};

use elovation::rating::{NewGameResult, Player, Team};

// ============================================================================
// Result Creation Utilities
// ============================================================================

const NAMES: [&str; 8] = [
    "alice", "bob", "charlie", "david", "erin", "frank", "grace", "heidi",
];

/// Player with a stable name derived from the id.
pub fn player(id: i64) -> Player {
    let name = usize::try_from(id - 1)
        .ok()
        .and_then(|i| NAMES.get(i))
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("player-{id}"));
    Player::new(id, name)
}

/// Midnight-relative timestamp: `day` of January 2024 plus `hour` hours.
pub fn at(day: u32, hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap() + Duration::hours(hour)
}

pub struct ResultBuilder {
    game_id: i64,
    created_at: DateTime<Utc>,
    teams: Vec<Team>,
}

impl ResultBuilder {
    pub fn new(game_id: i64) -> Self {
        Self {
            game_id,
            created_at: at(1, 12),
            teams: vec![],
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn on_day(self, day: u32) -> Self {
        self.at(at(day, 12))
    }

    pub fn team(mut self, rank: u32, players: &[i64]) -> Self {
        self.teams
            .push(Team::new(rank, players.iter().copied().map(player).collect()));
        self
    }

    /// One-on-one where `winner` beats `loser`.
    pub fn duel(self, winner: i64, loser: i64) -> Self {
        self.team(1, &[winner]).team(2, &[loser])
    }

    pub fn draw(self, a: i64, b: i64) -> Self {
        self.team(1, &[a]).team(1, &[b])
    }

    pub fn build(self) -> NewGameResult {
        NewGameResult {
            game_id: self.game_id,
            created_at: self.created_at,
            teams: self.teams,
        }
    }
}
