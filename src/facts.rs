//! Fact collections — the normalized rows one replay produces
//!
//! Twelve typed collections, one per target table. These are plain data:
//! the extractor fills them, the writer persists them. Field types line up
//! with the SQL schema in `storage::migrations`.

/// Everything extracted from one replay document, keyed by `table_id`.
#[derive(Debug, Clone, Default)]
pub struct GameFacts {
    pub table_id: i64,
    pub game_stats: GameStats,
    pub player_stats: Vec<GamePlayerStats>,
    pub starting_corporations: Vec<StartingHandCorporation>,
    pub starting_preludes: Vec<StartingHandPrelude>,
    pub starting_cards: Vec<StartingHandCard>,
    pub milestones: Vec<GameMilestone>,
    pub awards: Vec<GamePlayerAward>,
    pub parameter_changes: Vec<ParameterChange>,
    pub cards: Vec<GameCard>,
    pub cities: Vec<GameCityLocation>,
    pub greeneries: Vec<GameGreeneryLocation>,
    pub tracker_changes: Vec<PlayerTrackerChange>,
}

/// One row per game. Keyed merge on `table_id`.
#[derive(Debug, Clone, Default)]
pub struct GameStats {
    pub table_id: i64,
    pub generations: Option<i32>,
    pub duration_minutes: Option<i32>,
    pub player_count: i32,
    /// Winning player id, explicit or derived from final VP.
    pub winner: Option<i64>,
    pub game_date: Option<String>,
    pub map: Option<String>,
    pub prelude_on: Option<bool>,
    pub colonies_on: Option<bool>,
    pub corporate_era_on: Option<bool>,
    pub draft_on: Option<bool>,
    pub beginners_corporations_on: Option<bool>,
    pub game_speed: Option<String>,
}

/// One row per (game, player). Keyed merge.
#[derive(Debug, Clone, Default)]
pub struct GamePlayerStats {
    pub table_id: i64,
    pub player_id: i64,
    pub player_name: Option<String>,
    pub corporation: Option<String>,
    pub final_score: Option<i32>,
    pub final_tr: Option<i32>,
    pub award_points: Option<i32>,
    pub milestone_points: Option<i32>,
    pub city_points: Option<i32>,
    pub greenery_points: Option<i32>,
    pub card_points: Option<i32>,
    pub elo_rating: Option<i32>,
}

/// Corporation offered to a player at setup. Scoped replace per player.
#[derive(Debug, Clone)]
pub struct StartingHandCorporation {
    pub table_id: i64,
    pub player_id: i64,
    pub corporation: String,
    pub kept: bool,
}

/// Prelude offered to a player at setup. Scoped replace per player.
#[derive(Debug, Clone)]
pub struct StartingHandPrelude {
    pub table_id: i64,
    pub player_id: i64,
    pub prelude: String,
    pub kept: bool,
}

/// Project card offered to a player at setup. Scoped replace per player.
#[derive(Debug, Clone)]
pub struct StartingHandCard {
    pub table_id: i64,
    pub player_id: i64,
    pub card: String,
    pub kept: bool,
}

/// Milestone outcome. Scoped replace per game.
#[derive(Debug, Clone)]
pub struct GameMilestone {
    pub table_id: i64,
    pub milestone: String,
    pub claimed_by: Option<i64>,
    pub claimed_gen: Option<i32>,
}

/// One player's standing in one award. Scoped replace per game.
#[derive(Debug, Clone)]
pub struct GamePlayerAward {
    pub table_id: i64,
    pub player_id: i64,
    pub award: String,
    /// Whether this player was the one who funded the award.
    pub funded: bool,
    pub funded_gen: Option<i32>,
    /// 1..N placement in the final standings.
    pub place: Option<i32>,
    /// The counted quantity behind the placement.
    pub counter: Option<i32>,
}

/// Global parameter raised. Scoped replace per game. Strictly-increasing
/// events only; at most one row per (parameter, generation) carrying the
/// value after the last raise of that generation.
#[derive(Debug, Clone)]
pub struct ParameterChange {
    pub table_id: i64,
    pub parameter: Parameter,
    pub generation: i32,
    pub increased_to: i32,
    pub increased_by: Option<i64>,
}

/// Card lifecycle for one (player, card). Staged bulk replace per player.
/// Each stage records the generation at which it was first observed.
#[derive(Debug, Clone, Default)]
pub struct GameCard {
    pub table_id: i64,
    pub player_id: i64,
    pub card: String,
    pub seen_gen: Option<i32>,
    pub drawn_gen: Option<i32>,
    pub kept_gen: Option<i32>,
    pub drafted_gen: Option<i32>,
    pub bought_gen: Option<i32>,
    pub played_gen: Option<i32>,
    pub draw_type: Option<DrawType>,
    pub draw_reason: Option<DrawReason>,
    /// VP the card scored at the time it was played.
    pub vp_scored: Option<i32>,
}

/// City tile placement. Staged bulk replace per game.
#[derive(Debug, Clone)]
pub struct GameCityLocation {
    pub table_id: i64,
    pub player_id: i64,
    pub location: String,
    pub points: Option<i32>,
    pub placed_gen: Option<i32>,
}

/// Greenery tile placement. Staged bulk replace per game.
#[derive(Debug, Clone)]
pub struct GameGreeneryLocation {
    pub table_id: i64,
    pub player_id: i64,
    pub location: String,
    pub placed_gen: Option<i32>,
}

/// A tracked counter changing value. Staged bulk replace per game. Records
/// only the value after the change.
#[derive(Debug, Clone)]
pub struct PlayerTrackerChange {
    pub table_id: i64,
    pub player_id: i64,
    pub kind: TrackerKind,
    /// Which counter: tag, production or resource name ("steel", "science", ...).
    pub tracker: String,
    pub generation: i32,
    pub value: i32,
}

/// Global board parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Parameter {
    Temperature,
    Oxygen,
    Oceans,
}

impl Parameter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Oxygen => "oxygen",
            Self::Oceans => "oceans",
        }
    }

    /// Value before any raise, used to decide whether the first observed
    /// point is an increase.
    pub fn baseline(self) -> i32 {
        match self {
            Self::Temperature => -30,
            Self::Oxygen => 0,
            Self::Oceans => 0,
        }
    }
}

/// Kind of per-player counter a tracker change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrackerKind {
    Tag,
    Production,
    Resource,
}

impl TrackerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Production => "production",
            Self::Resource => "resource",
        }
    }
}

/// Terminal classification of how a card entered the player's hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawType {
    StartingHand,
    Draft,
    Regular,
    Effect,
}

impl DrawType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartingHand => "starting_hand",
            Self::Draft => "draft",
            Self::Regular => "regular",
            Self::Effect => "effect",
        }
    }
}

/// Why the card was drawn, refining `DrawType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    InitialDeal,
    DraftPick,
    ResearchPhase,
    CardEffect,
}

impl DrawReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialDeal => "initial_deal",
            Self::DraftPick => "draft_pick",
            Self::ResearchPhase => "research_phase",
            Self::CardEffect => "card_effect",
        }
    }
}
