//! Integration Tests: Feed Composition
//!
//! Coverage:
//! - Default, owner and category feeds
//! - ID-set feeds below and above the membership limit, both strategies
//! - Saved feed: stale marks, empty state, sign-in requirement
//! - Analytics ordering with view ties
//! - Watch view and counter tracking

mod common;

use common::fixtures::{self, seed_legacy_page, seed_link, seed_mark, seed_page, seed_video};
use reels_service::config::{FeedConfig, IdSetStrategy};
use reels_service::domain::{Identity, Post, PostId, UserId};
use reels_service::repository::posts_collection;
use reels_service::services::{FeedFilter, FeedService, Listing, SessionContext};
use reels_service::store::MemoryStore;
use reels_service::AppError;
use std::sync::Arc;

fn feed(store: &Arc<MemoryStore>, strategy: IdSetStrategy) -> FeedService {
    FeedService::new(
        store.clone(),
        FeedConfig {
            id_set_strategy: strategy,
            ..FeedConfig::default()
        },
    )
}

fn ids(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|p| p.id.as_str()).collect()
}

fn post_ids(raw: &[&str]) -> Vec<PostId> {
    raw.iter().map(|id| PostId::from(*id)).collect()
}

/// Fifteen video posts `p00`..`p14`, `p14` newest
fn seed_fifteen(store: &MemoryStore) {
    for i in 0..15u32 {
        seed_video(store, &format!("p{i:02}"), "owner", i, 0);
    }
}

async fn signed_in(store: &Arc<MemoryStore>, uid: &str) -> SessionContext {
    let session = SessionContext::new(store.clone());
    session
        .apply_auth_change(Some(Identity::new(uid, format!("{uid}@example.com"))))
        .await;
    session
}

#[tokio::test]
async fn test_default_feed_is_newest_first() {
    let store = fixtures::store();
    seed_video(&store, "a", "u1", 1, 0);
    seed_video(&store, "b", "u2", 3, 0);
    seed_page(&store, "c", "u1", 2, "food");

    let posts = feed(&store, IdSetStrategy::FullScan)
        .fetch_posts(&FeedFilter::All)
        .await
        .unwrap();

    assert_eq!(ids(&posts), vec!["b", "c", "a"]);
}

#[tokio::test]
async fn test_owner_feed_only_returns_owner_posts() {
    let store = fixtures::store();
    seed_video(&store, "a", "u1", 1, 0);
    seed_video(&store, "b", "u2", 2, 0);
    seed_video(&store, "c", "u1", 3, 0);

    let posts = feed(&store, IdSetStrategy::FullScan)
        .fetch_posts(&FeedFilter::Owner(UserId::from("u1")))
        .await
        .unwrap();

    assert_eq!(ids(&posts), vec!["c", "a"]);
}

#[tokio::test]
async fn test_category_feed_filters_page_references() {
    let store = fixtures::store();
    seed_page(&store, "food1", "u1", 1, "food");
    seed_page(&store, "shop1", "u1", 2, "fashion");
    seed_page(&store, "food2", "u2", 3, "food");
    seed_video(&store, "vid", "u1", 4, 0);

    let service = feed(&store, IdSetStrategy::FullScan);

    let food = service
        .fetch_posts(&FeedFilter::category("food"))
        .await
        .unwrap();
    assert_eq!(ids(&food), vec!["food2", "food1"]);

    let all = service
        .fetch_posts(&FeedFilter::category("all"))
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_category_feed_includes_legacy_kind_name() {
    let store = fixtures::store();
    seed_legacy_page(&store, "old-food", "u1", 1, "food");
    seed_page(&store, "new-food", "u2", 2, "food");
    seed_legacy_page(&store, "old-food2", "u2", 3, "food");
    seed_legacy_page(&store, "old-shop", "u1", 4, "fashion");

    let food = feed(&store, IdSetStrategy::FullScan)
        .fetch_posts(&FeedFilter::category("food"))
        .await
        .unwrap();

    assert_eq!(ids(&food), vec!["old-food2", "new-food", "old-food"]);
    assert!(food
        .iter()
        .all(|post| post.content.category() == Some("food")));
}

#[tokio::test]
async fn test_small_id_set_uses_one_membership_query() {
    let store = fixtures::store();
    seed_fifteen(&store);

    let wanted = post_ids(&["p01", "p07", "p03", "p07"]);
    let posts = feed(&store, IdSetStrategy::FullScan)
        .fetch_posts(&FeedFilter::Ids(wanted))
        .await
        .unwrap();

    assert_eq!(ids(&posts), vec!["p07", "p03", "p01"]);
    let log = store.query_log();
    assert_eq!(log.len(), 1);
    assert!(log[0].has_membership_filter());
}

#[tokio::test]
async fn test_large_id_set_full_scan() {
    let store = fixtures::store();
    seed_fifteen(&store);
    seed_video(&store, "other", "someone", 20, 0);

    let wanted: Vec<PostId> = (0..12u32).map(|i| PostId::new(format!("p{i:02}"))).collect();
    let posts = feed(&store, IdSetStrategy::FullScan)
        .fetch_posts(&FeedFilter::Ids(wanted))
        .await
        .unwrap();

    let expected: Vec<String> = (0..12u32).rev().map(|i| format!("p{i:02}")).collect();
    assert_eq!(ids(&posts), expected.iter().map(String::as_str).collect::<Vec<_>>());

    let log = store.query_log();
    assert_eq!(log.len(), 1);
    assert!(!log[0].has_membership_filter());
}

#[tokio::test]
async fn test_large_id_set_batched() {
    let store = fixtures::store();
    seed_fifteen(&store);
    seed_video(&store, "other", "someone", 20, 0);

    // interleaved so every batch spans the whole time range
    let wanted: Vec<PostId> = [0u32, 14, 2, 12, 4, 10, 6, 8, 1, 13, 3, 11]
        .iter()
        .map(|i| PostId::new(format!("p{i:02}")))
        .collect();
    let posts = feed(&store, IdSetStrategy::Batched)
        .fetch_posts(&FeedFilter::Ids(wanted))
        .await
        .unwrap();

    assert_eq!(
        ids(&posts),
        vec!["p14", "p13", "p12", "p11", "p10", "p08", "p06", "p04", "p03", "p02", "p01", "p00"]
    );

    let log = store.query_log();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|q| q.has_membership_filter()));
}

#[tokio::test]
async fn test_empty_id_set_returns_nothing() {
    let store = fixtures::store();
    seed_fifteen(&store);

    let posts = feed(&store, IdSetStrategy::FullScan)
        .fetch_posts(&FeedFilter::Ids(Vec::new()))
        .await
        .unwrap();

    assert!(posts.is_empty());
    assert!(store.query_log().is_empty());
}

#[tokio::test]
async fn test_read_failure_surfaces_as_read_error() {
    let store = fixtures::store();
    seed_fifteen(&store);
    store.set_fail_reads(true);

    let result = feed(&store, IdSetStrategy::FullScan)
        .fetch_posts(&FeedFilter::All)
        .await;

    assert!(matches!(result, Err(AppError::Read(_))));
    assert!(matches!(Listing::from_result(result), Listing::Unavailable(_)));
}

#[tokio::test]
async fn test_saved_feed_drops_deleted_posts() {
    let store = fixtures::store();
    seed_video(&store, "p1", "owner", 1, 0);
    seed_video(&store, "p2", "owner", 2, 0);
    seed_mark(&store, "m1", "viewer", "p1");
    seed_mark(&store, "m2", "viewer", "p2");
    seed_mark(&store, "m3", "viewer", "gone");
    seed_mark(&store, "m4", "someone-else", "p1");

    let session = signed_in(&store, "viewer").await;
    let posts = feed(&store, IdSetStrategy::FullScan)
        .saved_feed(&session)
        .await
        .unwrap();

    assert_eq!(ids(&posts), vec!["p2", "p1"]);
    assert!(session.is_saved(&PostId::from("gone")));
}

#[tokio::test]
async fn test_saved_feed_above_limit() {
    let store = fixtures::store();
    seed_fifteen(&store);
    for i in 0..15u32 {
        seed_mark(&store, &format!("m{i:02}"), "viewer", &format!("p{i:02}"));
    }

    let session = signed_in(&store, "viewer").await;
    for strategy in [IdSetStrategy::FullScan, IdSetStrategy::Batched] {
        let posts = feed(&store, strategy).saved_feed(&session).await.unwrap();
        assert_eq!(posts.len(), 15, "{strategy:?}");
        assert_eq!(posts[0].id.as_str(), "p14");
        assert_eq!(posts[14].id.as_str(), "p00");
    }
}

#[tokio::test]
async fn test_saved_feed_empty_state() {
    let store = fixtures::store();
    seed_fifteen(&store);

    let session = signed_in(&store, "viewer").await;
    store.clear_query_log();
    let posts = feed(&store, IdSetStrategy::FullScan)
        .saved_feed(&session)
        .await
        .unwrap();

    assert!(posts.is_empty());
    // only the saved-mark lookup, no post query
    assert_eq!(store.query_log().len(), 1);
}

#[tokio::test]
async fn test_saved_feed_requires_sign_in() {
    let store = fixtures::store();
    let session = SessionContext::new(store.clone());

    let result = feed(&store, IdSetStrategy::FullScan)
        .saved_feed(&session)
        .await;

    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_analytics_sorts_by_views_stably() {
    let store = fixtures::store();
    seed_video(&store, "old", "creator", 1, 5);
    seed_video(&store, "mid", "creator", 2, 2);
    seed_video(&store, "new", "creator", 3, 5);
    seed_video(&store, "foreign", "someone", 4, 100);

    let posts = feed(&store, IdSetStrategy::FullScan)
        .analytics_feed(&UserId::from("creator"))
        .await
        .unwrap();

    assert_eq!(ids(&posts), vec!["new", "old", "mid"]);
    let views: Vec<u64> = posts.iter().map(|p| p.views).collect();
    assert_eq!(views, vec![5, 5, 2]);
}

#[tokio::test]
async fn test_watch_counts_view_and_reports_saved() {
    let store = fixtures::store();
    seed_video(&store, "p1", "owner", 1, 3);
    seed_mark(&store, "m1", "viewer", "p1");

    let session = signed_in(&store, "viewer").await;
    let service = feed(&store, IdSetStrategy::FullScan);
    let view = service.watch(&session, &PostId::from("p1")).await.unwrap();

    assert_eq!(view.post.views, 3);
    assert!(view.saved);
    assert_eq!(view.comments, Listing::Empty);

    let stored = service
        .posts()
        .find_post(&PostId::from("p1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.views, 4);
}

#[tokio::test]
async fn test_watch_missing_post() {
    let store = fixtures::store();
    let session = SessionContext::new(store.clone());

    let result = feed(&store, IdSetStrategy::FullScan)
        .watch(&session, &PostId::from("missing"))
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_view_tracking_failure_is_swallowed() {
    let store = fixtures::store();
    seed_video(&store, "p1", "owner", 1, 0);
    let service = feed(&store, IdSetStrategy::FullScan);

    store.set_fail_writes(true);
    service.track_view(&PostId::from("p1")).await.unwrap();
    store.set_fail_writes(false);

    let post = service
        .posts()
        .find_post(&PostId::from("p1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(post.views, 0);
}

#[tokio::test]
async fn test_link_click_only_for_external_links() {
    let store = fixtures::store();
    seed_link(&store, "link", "owner", 1, "https://shop.example.com/item");
    seed_video(&store, "vid", "owner", 2, 0);
    let service = feed(&store, IdSetStrategy::FullScan);

    let posts = service.fetch_posts(&FeedFilter::All).await.unwrap();
    let (video, link) = (&posts[0], &posts[1]);

    assert!(service.track_link_click(video).is_none());

    let (target, handle) = service.track_link_click(link).unwrap();
    assert_eq!(target, "https://shop.example.com/item");
    handle.await.unwrap();

    let link = service
        .posts()
        .find_post(&PostId::from("link"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.link_clicks, 1);
}

#[tokio::test]
async fn test_deleted_post_leaves_feed() {
    let store = fixtures::store();
    seed_video(&store, "p1", "owner", 1, 0);
    seed_video(&store, "p2", "owner", 2, 0);
    let service = feed(&store, IdSetStrategy::FullScan);

    service.posts().delete_post(&PostId::from("p2")).await.unwrap();

    assert_eq!(store.count(&posts_collection()), 1);
    let posts = service.fetch_posts(&FeedFilter::All).await.unwrap();
    assert_eq!(ids(&posts), vec!["p1"]);
}
