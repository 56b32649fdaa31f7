//! Replay log document model
//!
//! One exported replay log describes one finished game from one player's
//! viewpoint. The exporter emits a single nested JSON document; this module
//! is the typed contract for that document plus the structural checks that
//! must pass before any extraction or database work starts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A full replay log for one game, captured from one player's perspective.
///
/// `replay_id` is shared by every perspective of the same game and becomes
/// the `table_id` key of every derived row.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawLogDocument {
    /// Decimal digits; parses to the game's table id.
    pub replay_id: String,
    /// Player id whose export this is. Must be a key of `players`.
    pub player_perspective: String,

    #[serde(default)]
    pub game_date: Option<String>,
    /// Wall-clock duration as `H:MM:SS` or `MM:SS`.
    #[serde(default)]
    pub game_duration: Option<String>,
    /// Winner as exported: either a player id or a player name.
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub generations: Option<i32>,

    // Map / variant flags
    #[serde(default)]
    pub map: Option<String>,
    #[serde(default)]
    pub prelude_on: Option<bool>,
    #[serde(default)]
    pub colonies_on: Option<bool>,
    #[serde(default)]
    pub corporate_era_on: Option<bool>,
    #[serde(default)]
    pub draft_on: Option<bool>,
    #[serde(default)]
    pub beginners_corporations_on: Option<bool>,
    #[serde(default)]
    pub game_speed: Option<String>,

    /// Player id → per-player summary. BTreeMap keeps iteration order stable
    /// so extraction is deterministic for identical input.
    pub players: BTreeMap<String, PlayerSummary>,

    /// Ordered move list. Empty for summary-only exports.
    #[serde(default)]
    pub moves: Vec<MoveRecord>,

    #[serde(default)]
    pub final_state: Option<FinalState>,
    #[serde(default)]
    pub parameter_progression: Option<ParameterProgression>,
}

/// Per-player summary block of the replay document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlayerSummary {
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
    /// Corporation the player ended up running.
    #[serde(default)]
    pub corporation: Option<String>,
    #[serde(default)]
    pub final_vp: Option<i32>,
    #[serde(default)]
    pub final_tr: Option<i32>,
    #[serde(default)]
    pub vp_breakdown: Option<VpBreakdown>,
    #[serde(default)]
    pub cards_played: Vec<String>,
    #[serde(default)]
    pub milestones_claimed: Vec<String>,
    #[serde(default)]
    pub awards_funded: Vec<String>,
    #[serde(default)]
    pub elo_data: Option<EloData>,
    /// Options offered to this player at setup, when the exporter saw them.
    #[serde(default)]
    pub starting_hand: Option<StartingHand>,
}

/// Final-score breakdown carried in the per-player summary.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VpBreakdown {
    #[serde(default)]
    pub total: Option<i32>,
    #[serde(default)]
    pub tr: Option<i32>,
    #[serde(default)]
    pub awards: Option<i32>,
    #[serde(default)]
    pub milestones: Option<i32>,
    #[serde(default)]
    pub cities: Option<i32>,
    #[serde(default)]
    pub greeneries: Option<i32>,
    #[serde(default)]
    pub cards: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EloData {
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub games_played: Option<i32>,
}

/// Corporation / prelude / project-card options shown at game start.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StartingHand {
    #[serde(default)]
    pub corporations: Vec<String>,
    #[serde(default)]
    pub preludes: Vec<String>,
    #[serde(default)]
    pub cards: Vec<String>,
}

/// One entry of the ordered move list.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MoveRecord {
    pub move_number: i32,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Acting player id. Absent for game-driven moves (setup, phase changes).
    #[serde(default)]
    pub player_id: Option<String>,
    /// Free-form action text from the exporter ("play card", "fund award", ...).
    pub action: String,
    /// Named object of the action: card, prelude, milestone or award name.
    #[serde(default)]
    pub card: Option<String>,
    /// Board coordinate of a tile placement.
    #[serde(default)]
    pub tile: Option<String>,
    #[serde(default)]
    pub cost: Option<i32>,
    /// Embedded game-state snapshot taken after the move resolved.
    #[serde(default)]
    pub game_state: Option<GameSnapshot>,
}

/// Game-state snapshot embedded in a move record.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GameSnapshot {
    #[serde(default)]
    pub generation: Option<i32>,
    #[serde(default)]
    pub temperature: Option<i32>,
    #[serde(default)]
    pub oxygen: Option<i32>,
    #[serde(default)]
    pub oceans: Option<i32>,
    /// Player id → tracker values at this point in the game.
    #[serde(default)]
    pub player_states: BTreeMap<String, PlayerTrackerState>,
}

/// Tag counts, production rates and resource stocks for one player.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlayerTrackerState {
    #[serde(default)]
    pub tags: BTreeMap<String, i32>,
    #[serde(default)]
    pub production: BTreeMap<String, i32>,
    #[serde(default)]
    pub resources: BTreeMap<String, i32>,
}

/// Endgame block: board parameters, milestone/award outcomes and the
/// per-player scoring detail.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FinalState {
    #[serde(default)]
    pub temperature: Option<i32>,
    #[serde(default)]
    pub oxygen: Option<i32>,
    #[serde(default)]
    pub oceans: Option<i32>,
    #[serde(default)]
    pub milestones: Vec<MilestoneOutcome>,
    #[serde(default)]
    pub awards: Vec<AwardOutcome>,
    /// Player id → endgame VP detail.
    #[serde(default)]
    pub player_vp: BTreeMap<String, PlayerVpDetail>,
    /// Player id → final tracker values.
    #[serde(default)]
    pub player_trackers: BTreeMap<String, PlayerTrackerState>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MilestoneOutcome {
    pub milestone: String,
    #[serde(default)]
    pub claimed_by: Option<String>,
    #[serde(default)]
    pub generation: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AwardOutcome {
    pub award: String,
    #[serde(default)]
    pub funded_by: Option<String>,
    #[serde(default)]
    pub generation: Option<i32>,
    /// Final standings, best place first.
    #[serde(default)]
    pub standings: Vec<AwardStanding>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AwardStanding {
    pub player_id: String,
    /// 1..N placement in the award.
    pub place: i32,
    /// The counted quantity the award ranks (tags, tiles, ...).
    #[serde(default)]
    pub counter: Option<i32>,
}

/// Per-player endgame VP detail, one tagged category per scoring source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlayerVpDetail {
    #[serde(default)]
    pub total: Option<i32>,
    #[serde(default)]
    pub tr: Option<i32>,
    #[serde(default)]
    pub awards: Option<VpCategory>,
    #[serde(default)]
    pub milestones: Option<VpCategory>,
    #[serde(default)]
    pub cities: Option<VpCategory>,
    #[serde(default)]
    pub greeneries: Option<VpCategory>,
    #[serde(default)]
    pub cards: Option<VpCategory>,
}

/// One scoring category: its VP subtotal plus the named entries behind it
/// (card names, award names, or board coordinates for tiles).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VpCategory {
    #[serde(default)]
    pub vp: Option<i32>,
    #[serde(default)]
    pub entries: Vec<VpEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VpEntry {
    pub name: String,
    #[serde(default)]
    pub vp: Option<i32>,
}

/// Ordered (generation, value) points per global parameter.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParameterProgression {
    #[serde(default)]
    pub temperature: Vec<ParameterPoint>,
    #[serde(default)]
    pub oxygen: Vec<ParameterPoint>,
    #[serde(default)]
    pub oceans: Vec<ParameterPoint>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParameterPoint {
    pub generation: i32,
    /// Parameter value after the raise.
    pub value: i32,
    /// Player id that triggered the raise, when the exporter attributed it.
    #[serde(default)]
    pub raised_by: Option<String>,
}

/// Structural problems detected before any extraction or database work.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("replay_id '{0}' is not a positive integer")]
    BadReplayId(String),
    #[error("player id '{0}' is not a positive integer")]
    BadPlayerId(String),
    #[error("players map is empty")]
    NoPlayers,
    #[error("player_perspective '{0}' is not a key of the players map")]
    UnknownPerspective(String),
}

/// Parse a decimal-digit player id as exported.
pub fn parse_player_id(raw: &str) -> Result<i64, ValidationError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::BadPlayerId(raw.to_string())),
    }
}

impl RawLogDocument {
    /// The game's table id: `replay_id` parsed as a positive integer.
    pub fn table_id(&self) -> Result<i64, ValidationError> {
        match self.replay_id.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(id),
            _ => Err(ValidationError::BadReplayId(self.replay_id.clone())),
        }
    }

    /// Structural validation. Runs before extraction; nothing is written for
    /// a document that fails here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.table_id()?;

        if self.players.is_empty() {
            return Err(ValidationError::NoPlayers);
        }
        if !self.players.contains_key(&self.player_perspective) {
            return Err(ValidationError::UnknownPerspective(
                self.player_perspective.clone(),
            ));
        }
        for key in self.players.keys() {
            parse_player_id(key)?;
        }

        Ok(())
    }
}
