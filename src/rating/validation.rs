use std::collections::BTreeMap;

use super::{Game, PlayerId, RatingError, RatingModel, Team};

/// Checks a submitted set of teams against the game's constraints.
///
/// Every violated rule is reported, joined into one [`RatingError::Validation`]
/// message. Empty teams are ignored for team and player counts.
pub fn validate_result(game: &Game, teams: &[Team]) -> Result<(), RatingError> {
    let mut errors = Vec::new();

    let filled: Vec<&Team> = teams.iter().filter(|t| !t.players.is_empty()).collect();
    if filled.len() < 2 {
        errors.push("At least 2 teams with players are required".to_string());
    }

    let team_count = filled.len() as u32;
    if team_count < game.min_teams {
        errors.push(format!("At least {} teams are required", game.min_teams));
    }
    if let Some(max) = game.max_teams {
        if team_count > max {
            errors.push(format!("Maximum {max} teams are allowed"));
        }
    }

    for (index, team) in teams.iter().enumerate() {
        let size = team.players.len() as u32;
        if size == 0 {
            continue;
        }
        if size < game.min_players_per_team {
            errors.push(format!(
                "Team {} needs at least {} players",
                index + 1,
                game.min_players_per_team
            ));
        }
        if let Some(max) = game.max_players_per_team {
            if size > max {
                errors.push(format!("Team {} can have at most {max} players", index + 1));
            }
        }
    }

    if !game.allow_ties {
        let mut ranks: Vec<u32> = filled.iter().map(|t| t.rank).collect();
        ranks.sort_unstable();
        ranks.dedup();
        if ranks.len() != filled.len() {
            errors.push("Ties are not allowed in this game".to_string());
        }
    }

    let mut seen: BTreeMap<PlayerId, (&str, usize)> = BTreeMap::new();
    for player in teams.iter().flat_map(|t| &t.players) {
        seen.entry(player.id).or_insert((player.name.as_str(), 0)).1 += 1;
    }
    let duplicates: Vec<&str> = seen
        .values()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| *name)
        .collect();
    if !duplicates.is_empty() {
        let noun = if duplicates.len() > 1 { "Players" } else { "Player" };
        errors.push(format!(
            "{noun} {} cannot be in multiple teams",
            duplicates.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RatingError::Validation(errors.join(". ")))
    }
}

/// Checks that a game definition is internally consistent.
pub fn validate_game(game: &Game) -> Result<(), RatingError> {
    let mut errors = Vec::new();

    if game.name.trim().is_empty() {
        errors.push("Name is required".to_string());
    }
    if game.min_teams < 2 {
        errors.push("Minimum number of teams must be at least 2".to_string());
    }
    if matches!(game.max_teams, Some(max) if max < game.min_teams) {
        errors.push("Maximum number of teams must not be below the minimum".to_string());
    }
    if game.min_players_per_team < 1 {
        errors.push("Minimum number of players per team must be at least 1".to_string());
    }
    if matches!(game.max_players_per_team, Some(max) if max < game.min_players_per_team) {
        errors.push("Maximum number of players per team must not be below the minimum".to_string());
    }
    if game.rating_model == RatingModel::Elo
        && (game.min_teams != 2
            || game.max_teams != Some(2)
            || game.min_players_per_team != 1
            || game.max_players_per_team != Some(1))
    {
        errors.push("Elo games are played by exactly 2 teams of 1 player".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RatingError::Validation(errors.join(". ")))
    }
}

impl Game {
    pub fn validate(&self) -> Result<(), RatingError> {
        validate_game(self)
    }
}
