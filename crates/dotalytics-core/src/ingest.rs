//! Idempotent ingestion of external match data into local aggregates.
//!
//! Batch operations never fail across their own boundary: per-record
//! problems are skipped, logged, and counted. Single-match ingestion
//! returns a zero count instead of raising, including on natural-key
//! races with a concurrent ingester.

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    Hero, Match, MatchDetail, MatchIngest, MIN_MATCH_DURATION_SECS, Participation, Player, Side,
};
use crate::rate_limit::RateLimiter;
use crate::traits::{MatchDataApi, MatchStore};

/// Fetches external records and performs idempotent upsert plus aggregate
/// maintenance. Detail fetches go through the rate limiter.
#[derive(Clone)]
pub struct IngestionPipeline<A, S>
where
    A: MatchDataApi,
    S: MatchStore,
{
    api: A,
    store: S,
    limiter: RateLimiter,
}

impl<A, S> IngestionPipeline<A, S>
where
    A: MatchDataApi,
    S: MatchStore,
{
    pub fn new(api: A, store: S, limiter: RateLimiter) -> Self {
        Self {
            api,
            store,
            limiter,
        }
    }

    /// Ingest the full hero catalog. Existing heroes get their display
    /// fields refreshed; totals are never touched. Returns the number of
    /// newly created heroes.
    pub async fn ingest_heroes(&self) -> Result<usize, AppError> {
        let heroes = match self.api.get_heroes().await {
            Ok(heroes) => heroes,
            Err(e) => {
                tracing::warn!(error = %e, "Hero catalog unavailable");
                return Ok(0);
            }
        };

        if heroes.is_empty() {
            tracing::warn!("No heroes returned from API");
            return Ok(0);
        }

        let mut created = 0;
        for hero in &heroes {
            let image_url = hero.image_url();
            if self
                .store
                .upsert_hero_display(hero.id, &hero.localized_name, image_url.as_deref())
                .await?
            {
                created += 1;
            }
        }

        tracing::info!(total = heroes.len(), %created, "Hero catalog ingested");
        Ok(created)
    }

    /// Ingest up to `limit` recent matches. Candidates with an invalid id
    /// or an implausibly short duration are skipped, as are matches we
    /// already hold. Returns the number of matches newly ingested.
    pub async fn ingest_matches(&self, limit: usize) -> Result<usize, AppError> {
        let candidates = match self.api.get_recent_matches(limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Recent-matches feed unavailable");
                return Ok(0);
            }
        };

        if candidates.is_empty() {
            tracing::warn!("No matches returned from API");
            return Ok(0);
        }

        let mut count = 0;
        let mut skipped = 0;
        for candidate in &candidates {
            if candidate.match_id == 0 || candidate.duration < MIN_MATCH_DURATION_SECS {
                tracing::warn!(
                    match_id = candidate.match_id,
                    duration = candidate.duration,
                    "Skipping invalid/short match"
                );
                skipped += 1;
                continue;
            }

            if self.store.match_exists(candidate.match_id).await? {
                tracing::debug!(match_id = candidate.match_id, "Match already exists, skipping");
                skipped += 1;
                continue;
            }

            count += self.ingest_match_details(candidate.match_id).await?;
        }

        tracing::info!(%count, %skipped, total = candidates.len(), "Match batch ingested");
        Ok(count)
    }

    /// Ingest one match in full, or not at all. Returns 1 if the match
    /// was newly persisted, 0 otherwise (already present, detail
    /// unavailable, or the commit lost a natural-key race).
    pub async fn ingest_match_details(&self, match_id: i64) -> Result<usize, AppError> {
        // Re-check existence: the batch pre-check may have raced another
        // ingester.
        match self.store.match_exists(match_id).await {
            Ok(true) => {
                tracing::debug!(%match_id, "Match already exists, skipping");
                return Ok(0);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(%match_id, error = %e, "Existence check failed");
                return Ok(0);
            }
        }

        self.limiter.acquire().await;
        let calls_in_window = self.limiter.calls_in_window().await;
        tracing::debug!(%match_id, calls_in_window, "Fetching match detail");

        let detail = match self.api.get_match_detail(match_id).await {
            Ok(Some(detail)) => detail,
            Ok(None) => {
                tracing::warn!(%match_id, "No detail available for match");
                return Ok(0);
            }
            Err(e) => {
                tracing::warn!(%match_id, error = %e, "Failed to fetch match detail");
                return Ok(0);
            }
        };

        let ingest = build_ingest(&detail);

        match self.store.commit_match(&ingest).await {
            Ok(()) => {
                tracing::info!(
                    %match_id,
                    participants = ingest.participations.len(),
                    "Match ingested"
                );
                Ok(1)
            }
            Err(e) if e.is_duplicate_key() => {
                // A concurrent ingester won the race; the partial unit of
                // work was discarded by the store.
                tracing::warn!(%match_id, "Match inserted concurrently, skipping");
                Ok(0)
            }
            Err(e) => {
                tracing::error!(%match_id, error = %e, "Failed to commit match");
                Ok(0)
            }
        }
    }
}

/// Build the atomic unit of work for one match detail: the match row,
/// placeholder heroes/players for every participant, and the
/// participation rows with side and win resolved from the slot encoding.
fn build_ingest(detail: &MatchDetail) -> MatchIngest {
    let now = Utc::now();
    let match_row = Match {
        match_id: detail.match_id,
        start_time: DateTime::from_timestamp(detail.start_time, 0).unwrap_or_default(),
        duration: detail.duration,
        radiant_win: detail.radiant_win,
        processed_at: now,
    };

    let mut heroes: Vec<Hero> = Vec::new();
    let mut players: Vec<Player> = Vec::new();
    let mut participations = Vec::with_capacity(detail.players.len());

    for participant in &detail.players {
        if !heroes.iter().any(|h| h.hero_id == participant.hero_id) {
            heroes.push(Hero::placeholder(participant.hero_id));
        }
        if !players.iter().any(|p| p.player_id == participant.account_id) {
            players.push(Player::placeholder(participant.account_id));
        }

        let side = Side::from_slot(participant.player_slot);
        participations.push(Participation {
            match_id: detail.match_id,
            player_id: participant.account_id,
            hero_id: participant.hero_id,
            kills: participant.kills,
            deaths: participant.deaths,
            assists: participant.assists,
            radiant: side.is_radiant(),
            won: side.won(detail.radiant_win),
        });
    }

    MatchIngest {
        match_row,
        heroes,
        players,
        participations,
    }
}
