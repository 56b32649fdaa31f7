//! Database Migrations - PostgreSQL schema for replay statistics
//!
//! Forward-only schema for the twelve tables the ingestion pipeline owns.
//! Primary keys mirror the reconciliation scope of each table: keyed-merge
//! tables key on (table_id[, player_id]); replace-scoped tables add the
//! option/name column.

/// SQL migration for creating all tables
pub const MIGRATION_V1: &str = r#"
-- ============================================================================
-- Replay Statistics Schema v1
-- ============================================================================

-- ============================================================================
-- 1. Game-level facts (keyed merge)
-- ============================================================================

CREATE TABLE IF NOT EXISTS game_stats (
    table_id            BIGINT PRIMARY KEY,
    generations         INTEGER,
    duration_minutes    INTEGER,
    player_count        INTEGER NOT NULL,
    winner              BIGINT,
    game_date           TEXT,
    map                 TEXT,
    prelude_on          BOOLEAN,
    colonies_on         BOOLEAN,
    corporate_era_on    BOOLEAN,
    draft_on            BOOLEAN,
    beginners_corporations_on BOOLEAN,
    game_speed          TEXT,
    ingested_at         TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS game_player_stats (
    table_id            BIGINT NOT NULL,
    player_id           BIGINT NOT NULL,
    player_name         TEXT,
    corporation         TEXT,
    final_score         INTEGER,
    final_tr            INTEGER,
    award_points        INTEGER,
    milestone_points    INTEGER,
    city_points         INTEGER,
    greenery_points     INTEGER,
    card_points         INTEGER,
    elo_rating          INTEGER,

    PRIMARY KEY (table_id, player_id)
);

-- ============================================================================
-- 2. Starting hands (scoped replace, per player)
-- ============================================================================

CREATE TABLE IF NOT EXISTS starting_hand_corporations (
    table_id        BIGINT NOT NULL,
    player_id       BIGINT NOT NULL,
    corporation     TEXT NOT NULL,
    kept            BOOLEAN NOT NULL DEFAULT FALSE,

    PRIMARY KEY (table_id, player_id, corporation)
);

CREATE TABLE IF NOT EXISTS starting_hand_preludes (
    table_id        BIGINT NOT NULL,
    player_id       BIGINT NOT NULL,
    prelude         TEXT NOT NULL,
    kept            BOOLEAN NOT NULL DEFAULT FALSE,

    PRIMARY KEY (table_id, player_id, prelude)
);

CREATE TABLE IF NOT EXISTS starting_hand_cards (
    table_id        BIGINT NOT NULL,
    player_id       BIGINT NOT NULL,
    card            TEXT NOT NULL,
    kept            BOOLEAN NOT NULL DEFAULT FALSE,

    PRIMARY KEY (table_id, player_id, card)
);

-- ============================================================================
-- 3. Milestones, awards, parameter raises (scoped replace, per game)
-- ============================================================================

CREATE TABLE IF NOT EXISTS game_milestones (
    table_id        BIGINT NOT NULL,
    milestone       TEXT NOT NULL,
    claimed_by      BIGINT,
    claimed_gen     INTEGER,

    PRIMARY KEY (table_id, milestone)
);

CREATE TABLE IF NOT EXISTS game_player_awards (
    table_id        BIGINT NOT NULL,
    player_id       BIGINT NOT NULL,
    award           TEXT NOT NULL,
    funded          BOOLEAN NOT NULL DEFAULT FALSE,
    funded_gen      INTEGER,
    place           INTEGER,
    counter         INTEGER,

    PRIMARY KEY (table_id, player_id, award)
);

CREATE TABLE IF NOT EXISTS parameter_changes (
    table_id        BIGINT NOT NULL,
    parameter       TEXT NOT NULL,      -- 'temperature' | 'oxygen' | 'oceans'
    generation      INTEGER NOT NULL,
    increased_to    INTEGER NOT NULL,
    increased_by    BIGINT,

    PRIMARY KEY (table_id, parameter, generation)
);

-- ============================================================================
-- 4. Bulk-loaded facts (staged bulk replace)
-- ============================================================================

CREATE TABLE IF NOT EXISTS game_cards (
    table_id        BIGINT NOT NULL,
    player_id       BIGINT NOT NULL,
    card            TEXT NOT NULL,
    seen_gen        INTEGER,
    drawn_gen       INTEGER,
    kept_gen        INTEGER,
    drafted_gen     INTEGER,
    bought_gen      INTEGER,
    played_gen      INTEGER,
    draw_type       TEXT,               -- 'starting_hand' | 'draft' | 'regular' | 'effect'
    draw_reason     TEXT,
    vp_scored       INTEGER,

    PRIMARY KEY (table_id, player_id, card)
);

CREATE TABLE IF NOT EXISTS game_city_locations (
    table_id        BIGINT NOT NULL,
    player_id       BIGINT NOT NULL,
    location        TEXT NOT NULL,
    points          INTEGER,
    placed_gen      INTEGER,

    PRIMARY KEY (table_id, player_id, location)
);

CREATE TABLE IF NOT EXISTS game_greenery_locations (
    table_id        BIGINT NOT NULL,
    player_id       BIGINT NOT NULL,
    location        TEXT NOT NULL,
    placed_gen      INTEGER,

    PRIMARY KEY (table_id, player_id, location)
);

CREATE TABLE IF NOT EXISTS game_player_tracker_changes (
    table_id        BIGINT NOT NULL,
    player_id       BIGINT NOT NULL,
    tracker_kind    TEXT NOT NULL,      -- 'tag' | 'production' | 'resource'
    tracker         TEXT NOT NULL,
    generation      INTEGER NOT NULL,
    value           INTEGER NOT NULL,

    PRIMARY KEY (table_id, player_id, tracker_kind, tracker, generation)
);

-- Scoped deletes hit these tables by game id alone.
CREATE INDEX IF NOT EXISTS idx_city_locations_game ON game_city_locations(table_id);
CREATE INDEX IF NOT EXISTS idx_greenery_locations_game ON game_greenery_locations(table_id);
CREATE INDEX IF NOT EXISTS idx_tracker_changes_game ON game_player_tracker_changes(table_id);
CREATE INDEX IF NOT EXISTS idx_milestones_game ON game_milestones(table_id);
CREATE INDEX IF NOT EXISTS idx_awards_game ON game_player_awards(table_id);
CREATE INDEX IF NOT EXISTS idx_parameter_changes_game ON parameter_changes(table_id);
"#;

/// All migrations in order. Add new migrations at the end; never edit an
/// applied one.
pub fn get_migrations() -> Vec<(&'static str, &'static str)> {
    vec![("001_initial_schema", MIGRATION_V1)]
}
