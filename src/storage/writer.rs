//! Transactional writer - all facts for one game, one transaction
//!
//! Applies the twelve fact collections in a fixed order inside a single
//! database transaction: `game_stats` and `game_player_stats` first (the
//! rows everything else logically hangs off), then the nine remaining
//! collections. Any error rolls the whole transaction back; a game is either
//! fully ingested or untouched.
//!
//! Three reconciliation strategies, chosen per table:
//! - keyed merge: `INSERT ... ON CONFLICT DO UPDATE` (one row per key)
//! - scoped replace: delete the scope, insert the fresh rows
//! - staged bulk replace: bulk-load a temp staging table via `UNNEST`,
//!   delete the scope, repopulate from staging in one set-based insert

use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::facts::GameFacts;

/// Rows written per entity during one ingestion.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct WriteSummary {
    pub game_stats: u64,
    pub game_player_stats: u64,
    pub starting_hand_corporations: u64,
    pub starting_hand_preludes: u64,
    pub starting_hand_cards: u64,
    pub game_milestones: u64,
    pub game_player_awards: u64,
    pub parameter_changes: u64,
    pub game_cards: u64,
    pub game_city_locations: u64,
    pub game_greenery_locations: u64,
    pub game_player_tracker_changes: u64,
}

impl WriteSummary {
    pub fn total(&self) -> u64 {
        self.game_stats
            + self.game_player_stats
            + self.starting_hand_corporations
            + self.starting_hand_preludes
            + self.starting_hand_cards
            + self.game_milestones
            + self.game_player_awards
            + self.parameter_changes
            + self.game_cards
            + self.game_city_locations
            + self.game_greenery_locations
            + self.game_player_tracker_changes
    }
}

/// Write all facts for one game atomically.
///
/// The scope of every delete is derived from `facts.table_id` and the
/// document's player set, so re-ingesting a shrunken document clears stale
/// rows, and a collection that extracted zero rows still gets its scope
/// cleared.
pub async fn write_game_facts(
    pool: &PgPool,
    facts: &GameFacts,
) -> Result<WriteSummary, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut summary = WriteSummary::default();

    // Keyed merge: game row and player rows first.
    summary.game_stats = upsert_game_stats(&mut tx, facts).await?;
    summary.game_player_stats = upsert_game_player_stats(&mut tx, facts).await?;

    // Scoped replace, per player within the game.
    summary.starting_hand_corporations = replace_starting_corporations(&mut tx, facts).await?;
    summary.starting_hand_preludes = replace_starting_preludes(&mut tx, facts).await?;
    summary.starting_hand_cards = replace_starting_cards(&mut tx, facts).await?;

    // Scoped replace, per game.
    summary.game_milestones = replace_milestones(&mut tx, facts).await?;
    summary.game_player_awards = replace_awards(&mut tx, facts).await?;
    summary.parameter_changes = replace_parameter_changes(&mut tx, facts).await?;

    // Staged bulk replace for the large collections.
    summary.game_cards = bulk_replace_game_cards(&mut tx, facts).await?;
    summary.game_city_locations = bulk_replace_cities(&mut tx, facts).await?;
    summary.game_greenery_locations = bulk_replace_greeneries(&mut tx, facts).await?;
    summary.game_player_tracker_changes = bulk_replace_tracker_changes(&mut tx, facts).await?;

    tx.commit().await?;

    info!(
        "Ingested game {}: {} rows across 12 tables",
        facts.table_id,
        summary.total()
    );
    Ok(summary)
}

/// Player ids present in this document; the per-player delete scope.
fn document_players(facts: &GameFacts) -> Vec<i64> {
    facts.player_stats.iter().map(|p| p.player_id).collect()
}

// ============================================================================
// Keyed merge
// ============================================================================

async fn upsert_game_stats(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    let row = &facts.game_stats;
    let result = sqlx::query(
        "INSERT INTO game_stats (table_id, generations, duration_minutes, player_count,
                winner, game_date, map, prelude_on, colonies_on, corporate_era_on,
                draft_on, beginners_corporations_on, game_speed, ingested_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
         ON CONFLICT (table_id) DO UPDATE SET
            generations = EXCLUDED.generations,
            duration_minutes = EXCLUDED.duration_minutes,
            player_count = EXCLUDED.player_count,
            winner = EXCLUDED.winner,
            game_date = EXCLUDED.game_date,
            map = EXCLUDED.map,
            prelude_on = EXCLUDED.prelude_on,
            colonies_on = EXCLUDED.colonies_on,
            corporate_era_on = EXCLUDED.corporate_era_on,
            draft_on = EXCLUDED.draft_on,
            beginners_corporations_on = EXCLUDED.beginners_corporations_on,
            game_speed = EXCLUDED.game_speed,
            ingested_at = NOW()",
    )
    .bind(row.table_id)
    .bind(row.generations)
    .bind(row.duration_minutes)
    .bind(row.player_count)
    .bind(row.winner)
    .bind(&row.game_date)
    .bind(&row.map)
    .bind(row.prelude_on)
    .bind(row.colonies_on)
    .bind(row.corporate_era_on)
    .bind(row.draft_on)
    .bind(row.beginners_corporations_on)
    .bind(&row.game_speed)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn upsert_game_player_stats(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    let mut written = 0u64;
    for row in &facts.player_stats {
        let result = sqlx::query(
            "INSERT INTO game_player_stats (table_id, player_id, player_name, corporation,
                    final_score, final_tr, award_points, milestone_points, city_points,
                    greenery_points, card_points, elo_rating)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (table_id, player_id) DO UPDATE SET
                player_name = EXCLUDED.player_name,
                corporation = EXCLUDED.corporation,
                final_score = EXCLUDED.final_score,
                final_tr = EXCLUDED.final_tr,
                award_points = EXCLUDED.award_points,
                milestone_points = EXCLUDED.milestone_points,
                city_points = EXCLUDED.city_points,
                greenery_points = EXCLUDED.greenery_points,
                card_points = EXCLUDED.card_points,
                elo_rating = EXCLUDED.elo_rating",
        )
        .bind(row.table_id)
        .bind(row.player_id)
        .bind(&row.player_name)
        .bind(&row.corporation)
        .bind(row.final_score)
        .bind(row.final_tr)
        .bind(row.award_points)
        .bind(row.milestone_points)
        .bind(row.city_points)
        .bind(row.greenery_points)
        .bind(row.card_points)
        .bind(row.elo_rating)
        .execute(&mut *conn)
        .await?;
        written += result.rows_affected();
    }
    Ok(written)
}

// ============================================================================
// Scoped replace (per player within the game)
// ============================================================================

async fn replace_starting_corporations(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    let players = document_players(facts);
    sqlx::query("DELETE FROM starting_hand_corporations WHERE table_id = $1 AND player_id = ANY($2)")
        .bind(facts.table_id)
        .bind(&players)
        .execute(&mut *conn)
        .await?;

    let mut written = 0u64;
    for row in &facts.starting_corporations {
        sqlx::query(
            "INSERT INTO starting_hand_corporations (table_id, player_id, corporation, kept)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(row.table_id)
        .bind(row.player_id)
        .bind(&row.corporation)
        .bind(row.kept)
        .execute(&mut *conn)
        .await?;
        written += 1;
    }
    Ok(written)
}

async fn replace_starting_preludes(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    let players = document_players(facts);
    sqlx::query("DELETE FROM starting_hand_preludes WHERE table_id = $1 AND player_id = ANY($2)")
        .bind(facts.table_id)
        .bind(&players)
        .execute(&mut *conn)
        .await?;

    let mut written = 0u64;
    for row in &facts.starting_preludes {
        sqlx::query(
            "INSERT INTO starting_hand_preludes (table_id, player_id, prelude, kept)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(row.table_id)
        .bind(row.player_id)
        .bind(&row.prelude)
        .bind(row.kept)
        .execute(&mut *conn)
        .await?;
        written += 1;
    }
    Ok(written)
}

async fn replace_starting_cards(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    let players = document_players(facts);
    sqlx::query("DELETE FROM starting_hand_cards WHERE table_id = $1 AND player_id = ANY($2)")
        .bind(facts.table_id)
        .bind(&players)
        .execute(&mut *conn)
        .await?;

    let mut written = 0u64;
    for row in &facts.starting_cards {
        sqlx::query(
            "INSERT INTO starting_hand_cards (table_id, player_id, card, kept)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(row.table_id)
        .bind(row.player_id)
        .bind(&row.card)
        .bind(row.kept)
        .execute(&mut *conn)
        .await?;
        written += 1;
    }
    Ok(written)
}

// ============================================================================
// Scoped replace (per game)
// ============================================================================

async fn replace_milestones(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    sqlx::query("DELETE FROM game_milestones WHERE table_id = $1")
        .bind(facts.table_id)
        .execute(&mut *conn)
        .await?;

    let mut written = 0u64;
    for row in &facts.milestones {
        sqlx::query(
            "INSERT INTO game_milestones (table_id, milestone, claimed_by, claimed_gen)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(row.table_id)
        .bind(&row.milestone)
        .bind(row.claimed_by)
        .bind(row.claimed_gen)
        .execute(&mut *conn)
        .await?;
        written += 1;
    }
    Ok(written)
}

async fn replace_awards(conn: &mut PgConnection, facts: &GameFacts) -> Result<u64, sqlx::Error> {
    sqlx::query("DELETE FROM game_player_awards WHERE table_id = $1")
        .bind(facts.table_id)
        .execute(&mut *conn)
        .await?;

    let mut written = 0u64;
    for row in &facts.awards {
        sqlx::query(
            "INSERT INTO game_player_awards (table_id, player_id, award, funded,
                    funded_gen, place, counter)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(row.table_id)
        .bind(row.player_id)
        .bind(&row.award)
        .bind(row.funded)
        .bind(row.funded_gen)
        .bind(row.place)
        .bind(row.counter)
        .execute(&mut *conn)
        .await?;
        written += 1;
    }
    Ok(written)
}

async fn replace_parameter_changes(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    sqlx::query("DELETE FROM parameter_changes WHERE table_id = $1")
        .bind(facts.table_id)
        .execute(&mut *conn)
        .await?;

    let mut written = 0u64;
    for row in &facts.parameter_changes {
        sqlx::query(
            "INSERT INTO parameter_changes (table_id, parameter, generation,
                    increased_to, increased_by)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(row.table_id)
        .bind(row.parameter.as_str())
        .bind(row.generation)
        .bind(row.increased_to)
        .bind(row.increased_by)
        .execute(&mut *conn)
        .await?;
        written += 1;
    }
    Ok(written)
}

// ============================================================================
// Staged bulk replace
// ============================================================================

async fn bulk_replace_game_cards(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    let players = document_players(facts);

    if facts.cards.is_empty() {
        // Still clear the scope so stale rows from a prior ingestion go away.
        sqlx::query("DELETE FROM game_cards WHERE table_id = $1 AND player_id = ANY($2)")
            .bind(facts.table_id)
            .bind(&players)
            .execute(&mut *conn)
            .await?;
        return Ok(0);
    }

    sqlx::query("CREATE TEMP TABLE _stage_game_cards (LIKE game_cards) ON COMMIT DROP")
        .execute(&mut *conn)
        .await?;

    let n = facts.cards.len();
    let mut player_ids = Vec::with_capacity(n);
    let mut cards = Vec::with_capacity(n);
    let mut seen = Vec::with_capacity(n);
    let mut drawn = Vec::with_capacity(n);
    let mut kept = Vec::with_capacity(n);
    let mut drafted = Vec::with_capacity(n);
    let mut bought = Vec::with_capacity(n);
    let mut played = Vec::with_capacity(n);
    let mut draw_types: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut draw_reasons: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut vp_scored = Vec::with_capacity(n);
    for row in &facts.cards {
        player_ids.push(row.player_id);
        cards.push(row.card.as_str());
        seen.push(row.seen_gen);
        drawn.push(row.drawn_gen);
        kept.push(row.kept_gen);
        drafted.push(row.drafted_gen);
        bought.push(row.bought_gen);
        played.push(row.played_gen);
        draw_types.push(row.draw_type.map(|d| d.as_str()));
        draw_reasons.push(row.draw_reason.map(|d| d.as_str()));
        vp_scored.push(row.vp_scored);
    }

    sqlx::query(
        "INSERT INTO _stage_game_cards (table_id, player_id, card, seen_gen, drawn_gen,
                kept_gen, drafted_gen, bought_gen, played_gen, draw_type, draw_reason, vp_scored)
         SELECT $1::bigint, * FROM UNNEST($2::bigint[], $3::text[], $4::int[], $5::int[], $6::int[],
                $7::int[], $8::int[], $9::int[], $10::text[], $11::text[], $12::int[])",
    )
    .bind(facts.table_id)
    .bind(&player_ids)
    .bind(&cards)
    .bind(&seen)
    .bind(&drawn)
    .bind(&kept)
    .bind(&drafted)
    .bind(&bought)
    .bind(&played)
    .bind(&draw_types)
    .bind(&draw_reasons)
    .bind(&vp_scored)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM game_cards WHERE table_id = $1 AND player_id = ANY($2)")
        .bind(facts.table_id)
        .bind(&players)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query(
        "INSERT INTO game_cards (table_id, player_id, card, seen_gen, drawn_gen, kept_gen,
                drafted_gen, bought_gen, played_gen, draw_type, draw_reason, vp_scored)
         SELECT table_id, player_id, card, seen_gen, drawn_gen, kept_gen,
                drafted_gen, bought_gen, played_gen, draw_type, draw_reason, vp_scored
         FROM _stage_game_cards",
    )
    .execute(&mut *conn)
    .await?;

    debug!("game_cards bulk replace: {} rows", result.rows_affected());
    Ok(result.rows_affected())
}

async fn bulk_replace_cities(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    if facts.cities.is_empty() {
        sqlx::query("DELETE FROM game_city_locations WHERE table_id = $1")
            .bind(facts.table_id)
            .execute(&mut *conn)
            .await?;
        return Ok(0);
    }

    sqlx::query("CREATE TEMP TABLE _stage_cities (LIKE game_city_locations) ON COMMIT DROP")
        .execute(&mut *conn)
        .await?;

    let n = facts.cities.len();
    let mut player_ids = Vec::with_capacity(n);
    let mut locations = Vec::with_capacity(n);
    let mut points = Vec::with_capacity(n);
    let mut placed = Vec::with_capacity(n);
    for row in &facts.cities {
        player_ids.push(row.player_id);
        locations.push(row.location.as_str());
        points.push(row.points);
        placed.push(row.placed_gen);
    }

    sqlx::query(
        "INSERT INTO _stage_cities (table_id, player_id, location, points, placed_gen)
         SELECT $1::bigint, * FROM UNNEST($2::bigint[], $3::text[], $4::int[], $5::int[])",
    )
    .bind(facts.table_id)
    .bind(&player_ids)
    .bind(&locations)
    .bind(&points)
    .bind(&placed)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM game_city_locations WHERE table_id = $1")
        .bind(facts.table_id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query(
        "INSERT INTO game_city_locations (table_id, player_id, location, points, placed_gen)
         SELECT table_id, player_id, location, points, placed_gen FROM _stage_cities",
    )
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn bulk_replace_greeneries(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    if facts.greeneries.is_empty() {
        sqlx::query("DELETE FROM game_greenery_locations WHERE table_id = $1")
            .bind(facts.table_id)
            .execute(&mut *conn)
            .await?;
        return Ok(0);
    }

    sqlx::query("CREATE TEMP TABLE _stage_greeneries (LIKE game_greenery_locations) ON COMMIT DROP")
        .execute(&mut *conn)
        .await?;

    let n = facts.greeneries.len();
    let mut player_ids = Vec::with_capacity(n);
    let mut locations = Vec::with_capacity(n);
    let mut placed = Vec::with_capacity(n);
    for row in &facts.greeneries {
        player_ids.push(row.player_id);
        locations.push(row.location.as_str());
        placed.push(row.placed_gen);
    }

    sqlx::query(
        "INSERT INTO _stage_greeneries (table_id, player_id, location, placed_gen)
         SELECT $1::bigint, * FROM UNNEST($2::bigint[], $3::text[], $4::int[])",
    )
    .bind(facts.table_id)
    .bind(&player_ids)
    .bind(&locations)
    .bind(&placed)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM game_greenery_locations WHERE table_id = $1")
        .bind(facts.table_id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query(
        "INSERT INTO game_greenery_locations (table_id, player_id, location, placed_gen)
         SELECT table_id, player_id, location, placed_gen FROM _stage_greeneries",
    )
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn bulk_replace_tracker_changes(
    conn: &mut PgConnection,
    facts: &GameFacts,
) -> Result<u64, sqlx::Error> {
    if facts.tracker_changes.is_empty() {
        sqlx::query("DELETE FROM game_player_tracker_changes WHERE table_id = $1")
            .bind(facts.table_id)
            .execute(&mut *conn)
            .await?;
        return Ok(0);
    }

    sqlx::query(
        "CREATE TEMP TABLE _stage_tracker_changes (LIKE game_player_tracker_changes) ON COMMIT DROP",
    )
    .execute(&mut *conn)
    .await?;

    let n = facts.tracker_changes.len();
    let mut player_ids = Vec::with_capacity(n);
    let mut kinds = Vec::with_capacity(n);
    let mut trackers = Vec::with_capacity(n);
    let mut generations = Vec::with_capacity(n);
    let mut values = Vec::with_capacity(n);
    for row in &facts.tracker_changes {
        player_ids.push(row.player_id);
        kinds.push(row.kind.as_str());
        trackers.push(row.tracker.as_str());
        generations.push(row.generation);
        values.push(row.value);
    }

    sqlx::query(
        "INSERT INTO _stage_tracker_changes (table_id, player_id, tracker_kind, tracker,
                generation, value)
         SELECT $1::bigint, * FROM UNNEST($2::bigint[], $3::text[], $4::text[], $5::int[], $6::int[])",
    )
    .bind(facts.table_id)
    .bind(&player_ids)
    .bind(&kinds)
    .bind(&trackers)
    .bind(&generations)
    .bind(&values)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM game_player_tracker_changes WHERE table_id = $1")
        .bind(facts.table_id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query(
        "INSERT INTO game_player_tracker_changes (table_id, player_id, tracker_kind,
                tracker, generation, value)
         SELECT table_id, player_id, tracker_kind, tracker, generation, value
         FROM _stage_tracker_changes",
    )
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_summary_totals_every_entity() {
        let summary = WriteSummary {
            game_stats: 1,
            game_player_stats: 2,
            starting_hand_corporations: 3,
            starting_hand_preludes: 4,
            starting_hand_cards: 5,
            game_milestones: 6,
            game_player_awards: 7,
            parameter_changes: 8,
            game_cards: 9,
            game_city_locations: 10,
            game_greenery_locations: 11,
            game_player_tracker_changes: 12,
        };
        assert_eq!(summary.total(), 78);
    }
}
