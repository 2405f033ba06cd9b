use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Pool, Postgres};

use dotalytics_core::error::AppError;
use dotalytics_core::models::MatchIngest;
use dotalytics_core::traits::MatchStore;

/// PostgreSQL-backed match store.
///
/// `commit_match` writes one match's whole unit of work inside a single
/// transaction so aggregates can never drift from the participation
/// rows that fed them.
#[derive(Clone)]
pub struct MatchRepository {
    pool: Pool<Postgres>,
}

impl MatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Heroes ranked by win rate, restricted to a minimum sample size.
    pub async fn top_heroes_by_win_rate(
        &self,
        limit: usize,
        min_picks: i32,
    ) -> Result<Vec<HeroWinRate>, AppError> {
        let rows = sqlx::query_as::<_, HeroWinRate>(
            r#"
            SELECT hero_id, name, image_url, total_picks, total_wins,
                   total_wins::float8 / total_picks::float8 * 100 AS win_rate
            FROM heroes
            WHERE total_picks >= $2
            ORDER BY win_rate DESC, total_picks DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .bind(min_picks)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows)
    }

    /// Players ranked by KDA, restricted to a minimum number of matches.
    pub async fn top_players_by_kda(
        &self,
        limit: usize,
        min_matches: i32,
    ) -> Result<Vec<PlayerKda>, AppError> {
        let rows = sqlx::query_as::<_, PlayerKda>(
            r#"
            SELECT player_id, name, total_kills, total_deaths, total_assists,
                   total_matches, total_wins,
                   CASE WHEN total_deaths > 0
                        THEN (total_kills + total_assists)::float8 / total_deaths::float8
                        ELSE (total_kills + total_assists)::float8
                   END AS kda
            FROM players
            WHERE total_matches >= $2
            ORDER BY kda DESC, total_matches DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .bind(min_matches)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows)
    }

    /// Ingested-match counts bucketed by start hour over the last
    /// `hours` hours.
    pub async fn match_volume_by_hour(&self, hours: i32) -> Result<Vec<HourlyVolume>, AppError> {
        let rows = sqlx::query_as::<_, HourlyVolume>(
            r#"
            SELECT date_trunc('hour', start_time) AS hour, COUNT(*) AS matches
            FROM matches
            WHERE start_time >= NOW() - make_interval(hours => $1)
            GROUP BY hour
            ORDER BY hour
            "#,
        )
        .bind(hours)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows)
    }
}

fn map_db_err(e: sqlx::Error) -> AppError {
    if let Some(db_err) = e.as_database_error()
        && db_err.is_unique_violation()
    {
        let constraint = db_err.constraint().unwrap_or("unknown").to_string();
        return AppError::DuplicateKey(constraint);
    }
    AppError::DatabaseError(e.to_string())
}

impl MatchStore for MatchRepository {
    async fn match_exists(&self, match_id: i64) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM matches WHERE match_id = $1)"#)
                .bind(match_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(exists)
    }

    async fn upsert_hero_display(
        &self,
        hero_id: i32,
        name: &str,
        image_url: Option<&str>,
    ) -> Result<bool, AppError> {
        // xmax = 0 distinguishes a fresh insert from a conflict-update.
        let created: bool = sqlx::query_scalar(
            r#"
            INSERT INTO heroes (hero_id, name, image_url)
            VALUES ($1, $2, $3)
            ON CONFLICT (hero_id) DO UPDATE
                SET name = EXCLUDED.name,
                    image_url = EXCLUDED.image_url,
                    last_updated = NOW()
            RETURNING (xmax = 0)
            "#,
        )
        .bind(hero_id)
        .bind(name)
        .bind(image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(created)
    }

    async fn commit_match(&self, ingest: &MatchIngest) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        // The match row goes first: a concurrent ingester racing on the
        // same id surfaces as a unique violation here and rolls the
        // whole unit of work back.
        sqlx::query(
            r#"
            INSERT INTO matches (match_id, start_time, duration, radiant_win, processed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(ingest.match_row.match_id)
        .bind(ingest.match_row.start_time)
        .bind(ingest.match_row.duration)
        .bind(ingest.match_row.radiant_win)
        .bind(ingest.match_row.processed_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        for hero in &ingest.heroes {
            sqlx::query(
                r#"
                INSERT INTO heroes (hero_id, name, image_url)
                VALUES ($1, $2, $3)
                ON CONFLICT (hero_id) DO NOTHING
                "#,
            )
            .bind(hero.hero_id)
            .bind(&hero.name)
            .bind(&hero.image_url)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        for player in &ingest.players {
            sqlx::query(
                r#"
                INSERT INTO players (player_id, name, avatar_url)
                VALUES ($1, $2, $3)
                ON CONFLICT (player_id) DO NOTHING
                "#,
            )
            .bind(player.player_id)
            .bind(&player.name)
            .bind(&player.avatar_url)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        for row in &ingest.participations {
            sqlx::query(
                r#"
                INSERT INTO participations
                    (match_id, player_id, hero_id, kills, deaths, assists, radiant, won)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(row.match_id)
            .bind(row.player_id)
            .bind(row.hero_id)
            .bind(row.kills)
            .bind(row.deaths)
            .bind(row.assists)
            .bind(row.radiant)
            .bind(row.won)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;

            sqlx::query(
                r#"
                UPDATE heroes
                SET total_picks = total_picks + 1,
                    total_wins = total_wins + CASE WHEN $2 THEN 1 ELSE 0 END,
                    last_updated = NOW()
                WHERE hero_id = $1
                "#,
            )
            .bind(row.hero_id)
            .bind(row.won)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;

            sqlx::query(
                r#"
                UPDATE players
                SET total_kills = total_kills + $2,
                    total_deaths = total_deaths + $3,
                    total_assists = total_assists + $4,
                    total_matches = total_matches + 1,
                    total_wins = total_wins + CASE WHEN $5 THEN 1 ELSE 0 END,
                    last_updated = NOW()
                WHERE player_id = $1
                "#,
            )
            .bind(row.player_id)
            .bind(row.kills)
            .bind(row.deaths)
            .bind(row.assists)
            .bind(row.won)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

// -- Read-model rows --

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HeroWinRate {
    pub hero_id: i32,
    pub name: String,
    pub image_url: Option<String>,
    pub total_picks: i32,
    pub total_wins: i32,
    pub win_rate: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlayerKda {
    pub player_id: i64,
    pub name: Option<String>,
    pub total_kills: i32,
    pub total_deaths: i32,
    pub total_assists: i32,
    pub total_matches: i32,
    pub total_wins: i32,
    pub kda: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HourlyVolume {
    pub hour: DateTime<Utc>,
    pub matches: i64,
}
