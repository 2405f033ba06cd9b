//! Domain entities and external-API DTOs.
//!
//! Match, Hero, Player, and Participation rows use externally assigned
//! natural keys; the ingestion pipeline must never create duplicates for
//! the same key. Hero and Player totals are derived, monotonically
//! accumulated aggregates, never recomputed from raw history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Matches shorter than this are treated as corrupt or non-representative
/// and are never ingested.
pub const MIN_MATCH_DURATION_SECS: i32 = 600;

/// Player slots below this value denote the Radiant side.
pub const RADIANT_SLOT_LIMIT: i32 = 128;

/// CDN prefix for hero images returned by the API as relative paths.
pub const IMAGE_CDN_BASE: &str = "https://cdn.cloudflare.steamstatic.com";

/// Which side of the map a participant played on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Radiant,
    Dire,
}

impl Side {
    /// Decode the side from the API's slot encoding.
    pub fn from_slot(slot: i32) -> Self {
        if slot < RADIANT_SLOT_LIMIT {
            Side::Radiant
        } else {
            Side::Dire
        }
    }

    pub fn is_radiant(&self) -> bool {
        matches!(self, Side::Radiant)
    }

    /// Whether this side won given the match outcome.
    pub fn won(&self, radiant_win: bool) -> bool {
        self.is_radiant() == radiant_win
    }
}

/// A locally persisted match, keyed by the external match id.
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub match_id: i64,
    pub start_time: DateTime<Utc>,
    /// Match length in seconds.
    pub duration: i32,
    pub radiant_win: bool,
    pub processed_at: DateTime<Utc>,
}

/// A hero with accumulated pick/win totals, keyed by the external hero id.
#[derive(Debug, Clone, Serialize)]
pub struct Hero {
    pub hero_id: i32,
    pub name: String,
    pub image_url: Option<String>,
    pub total_picks: i32,
    pub total_wins: i32,
    pub last_updated: DateTime<Utc>,
}

impl Hero {
    /// Placeholder for a hero seen in a match before the catalog knows it.
    /// Totals start at zero; a later IngestHeroes run refreshes the name.
    pub fn placeholder(hero_id: i32) -> Self {
        Self {
            hero_id,
            name: format!("Hero_{hero_id}"),
            image_url: Some(format!(
                "{IMAGE_CDN_BASE}/apps/dota2/images/dota_react/heroes/{hero_id}.png"
            )),
            total_picks: 0,
            total_wins: 0,
            last_updated: Utc::now(),
        }
    }
}

/// A player with accumulated totals, keyed by the external account id.
#[derive(Debug, Clone, Serialize)]
pub struct Player {
    pub player_id: i64,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub total_kills: i32,
    pub total_deaths: i32,
    pub total_assists: i32,
    pub total_matches: i32,
    pub total_wins: i32,
    pub last_updated: DateTime<Utc>,
}

impl Player {
    /// Placeholder for a player first seen in a match.
    pub fn placeholder(player_id: i64) -> Self {
        Self {
            player_id,
            name: Some(format!("Player_{player_id}")),
            avatar_url: None,
            total_kills: 0,
            total_deaths: 0,
            total_assists: 0,
            total_matches: 0,
            total_wins: 0,
            last_updated: Utc::now(),
        }
    }
}

/// One player's appearance in one match. Append-only per match; deleting
/// a match cascades to its participations.
#[derive(Debug, Clone, Serialize)]
pub struct Participation {
    pub match_id: i64,
    pub player_id: i64,
    pub hero_id: i32,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub radiant: bool,
    pub won: bool,
}

/// The atomic unit of work for one match: the match row, placeholder
/// heroes/players for unknown participants (insert-if-absent), and the
/// participation rows whose stats feed the aggregate totals. The store
/// commits all of it in a single transaction or none of it.
#[derive(Debug, Clone)]
pub struct MatchIngest {
    pub match_row: Match,
    pub heroes: Vec<Hero>,
    pub players: Vec<Player>,
    pub participations: Vec<Participation>,
}

// ---------------------------------------------------------------------------
// External API DTOs (snake_case JSON)
// ---------------------------------------------------------------------------

/// One entry of the hero catalog (`/heroes`).
#[derive(Debug, Clone, Deserialize)]
pub struct HeroSummary {
    pub id: i32,
    pub localized_name: String,
    #[serde(default)]
    pub img: Option<String>,
}

impl HeroSummary {
    /// Absolute image URL (the API returns a CDN-relative path).
    pub fn image_url(&self) -> Option<String> {
        self.img
            .as_deref()
            .map(|path| format!("{IMAGE_CDN_BASE}{path}"))
    }
}

/// A candidate match from the recent-matches feed (`/proMatches`).
#[derive(Debug, Clone, Deserialize)]
pub struct MatchSummary {
    pub match_id: i64,
    pub start_time: i64,
    pub duration: i32,
    pub radiant_win: bool,
}

/// Full match detail (`/matches/{id}`).
#[derive(Debug, Clone, Deserialize)]
pub struct MatchDetail {
    pub match_id: i64,
    pub start_time: i64,
    pub duration: i32,
    pub radiant_win: bool,
    #[serde(default)]
    pub players: Vec<ParticipantDetail>,
}

/// One participant inside a match detail.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantDetail {
    /// Anonymous accounts come back as null; they collapse onto id 0.
    #[serde(default, deserialize_with = "null_to_zero")]
    pub account_id: i64,
    pub hero_id: i32,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub player_slot: i32,
}

fn null_to_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}
