use chrono::Utc;
use dotalytics_core::error::AppError;
use dotalytics_core::models::{Hero, Match, MatchIngest, Participation, Player};
use dotalytics_core::traits::MatchStore;
use dotalytics_db::MatchRepository;

use crate::integration::common::setup_test_db;

/// One match with a single participant, won by the participant's side.
fn ingest_fixture(match_id: i64, player_id: i64, hero_id: i32, won: bool) -> MatchIngest {
    MatchIngest {
        match_row: Match {
            match_id,
            start_time: Utc::now(),
            duration: 2400,
            radiant_win: won,
            processed_at: Utc::now(),
        },
        heroes: vec![Hero::placeholder(hero_id)],
        players: vec![Player::placeholder(player_id)],
        participations: vec![Participation {
            match_id,
            player_id,
            hero_id,
            kills: 5,
            deaths: 2,
            assists: 7,
            radiant: true,
            won,
        }],
    }
}

#[tokio::test]
async fn upsert_hero_creates_then_refreshes_display() {
    let (pool, _container) = setup_test_db().await;
    let repo = MatchRepository::new(pool.clone());

    let created = repo
        .upsert_hero_display(1, "Anti-Mage", Some("https://cdn.example.com/am.png"))
        .await
        .unwrap();
    assert!(created);

    let refreshed = repo
        .upsert_hero_display(1, "Anti-Mage (Renamed)", None)
        .await
        .unwrap();
    assert!(!refreshed);

    let (name, picks): (String, i32) =
        sqlx::query_as("SELECT name, total_picks FROM heroes WHERE hero_id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(name, "Anti-Mage (Renamed)");
    assert_eq!(picks, 0);
}

#[tokio::test]
async fn commit_match_persists_all_rows() {
    let (pool, _container) = setup_test_db().await;
    let repo = MatchRepository::new(pool.clone());

    repo.commit_match(&ingest_fixture(100, 10, 1, true))
        .await
        .unwrap();

    assert!(repo.match_exists(100).await.unwrap());

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM participations WHERE match_id = 100")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);

    let (picks, wins): (i32, i32) =
        sqlx::query_as("SELECT total_picks, total_wins FROM heroes WHERE hero_id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!((picks, wins), (1, 1));
}

#[tokio::test]
async fn duplicate_commit_fails_with_duplicate_key() {
    let (pool, _container) = setup_test_db().await;
    let repo = MatchRepository::new(pool.clone());

    repo.commit_match(&ingest_fixture(100, 10, 1, true))
        .await
        .unwrap();
    let result = repo.commit_match(&ingest_fixture(100, 10, 1, true)).await;

    assert!(matches!(result, Err(AppError::DuplicateKey(_))));

    // The losing commit rolled back: aggregates were not double-counted.
    let (picks,): (i32,) = sqlx::query_as("SELECT total_picks FROM heroes WHERE hero_id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(picks, 1);
}

#[tokio::test]
async fn aggregates_accumulate_across_matches() {
    let (pool, _container) = setup_test_db().await;
    let repo = MatchRepository::new(pool.clone());

    repo.commit_match(&ingest_fixture(100, 10, 1, true))
        .await
        .unwrap();
    repo.commit_match(&ingest_fixture(200, 10, 1, false))
        .await
        .unwrap();

    let (kills, deaths, assists, matches, wins): (i32, i32, i32, i32, i32) = sqlx::query_as(
        "SELECT total_kills, total_deaths, total_assists, total_matches, total_wins
         FROM players WHERE player_id = 10",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!((kills, deaths, assists, matches, wins), (10, 4, 14, 2, 1));
}

#[tokio::test]
async fn placeholder_insert_preserves_existing_hero() {
    let (pool, _container) = setup_test_db().await;
    let repo = MatchRepository::new(pool.clone());

    repo.upsert_hero_display(1, "Anti-Mage", None).await.unwrap();
    repo.commit_match(&ingest_fixture(100, 10, 1, true))
        .await
        .unwrap();

    let (name,): (String,) = sqlx::query_as("SELECT name FROM heroes WHERE hero_id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(name, "Anti-Mage");
}

#[tokio::test]
async fn deleting_a_match_cascades_to_participations() {
    let (pool, _container) = setup_test_db().await;
    let repo = MatchRepository::new(pool.clone());

    repo.commit_match(&ingest_fixture(100, 10, 1, true))
        .await
        .unwrap();
    sqlx::query("DELETE FROM matches WHERE match_id = 100")
        .execute(&pool)
        .await
        .unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM participations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn top_heroes_respect_minimum_sample() {
    let (pool, _container) = setup_test_db().await;
    let repo = MatchRepository::new(pool.clone());

    // Hero 1: two picks, one win. Hero 2: one pick, one win.
    repo.commit_match(&ingest_fixture(100, 10, 1, true))
        .await
        .unwrap();
    repo.commit_match(&ingest_fixture(200, 10, 1, false))
        .await
        .unwrap();
    repo.commit_match(&ingest_fixture(300, 20, 2, true))
        .await
        .unwrap();

    let top = repo.top_heroes_by_win_rate(10, 2).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].hero_id, 1);
    assert_eq!(top[0].win_rate, 50.0);
}

#[tokio::test]
async fn top_players_are_ranked_by_kda() {
    let (pool, _container) = setup_test_db().await;
    let repo = MatchRepository::new(pool.clone());

    // Player 10: (5+7)/2 = 6.0 KDA. Player 20 in another match: same
    // stats, so same KDA; ranking falls back to match count.
    repo.commit_match(&ingest_fixture(100, 10, 1, true))
        .await
        .unwrap();
    repo.commit_match(&ingest_fixture(200, 10, 1, true))
        .await
        .unwrap();
    repo.commit_match(&ingest_fixture(300, 20, 2, true))
        .await
        .unwrap();

    let top = repo.top_players_by_kda(10, 1).await.unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].player_id, 10);
    assert_eq!(top[0].kda, 6.0);
}

#[tokio::test]
async fn match_volume_buckets_by_hour() {
    let (pool, _container) = setup_test_db().await;
    let repo = MatchRepository::new(pool.clone());

    repo.commit_match(&ingest_fixture(100, 10, 1, true))
        .await
        .unwrap();
    repo.commit_match(&ingest_fixture(200, 20, 2, true))
        .await
        .unwrap();

    let volume = repo.match_volume_by_hour(24).await.unwrap();
    let total: i64 = volume.iter().map(|v| v.matches).sum();
    assert_eq!(total, 2);
}
