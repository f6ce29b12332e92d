//! Seed helpers for the in-process document store
//!
//! Posts are seeded with fixed creation times so feed order is predictable:
//! a higher `minute` means a newer post.

use reels_service::repository::{posts_collection, saved_marks_collection};
use reels_service::store::{Fields, MemoryStore};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// RFC3339 timestamp `minute` minutes after a fixed base
pub fn at(minute: u32) -> String {
    format!("2024-05-01T{:02}:{:02}:00Z", 10 + minute / 60, minute % 60)
}

fn base_post(owner: &str, minute: u32, views: u64) -> Value {
    json!({
        "userId": owner,
        "userName": format!("{owner}@example.com"),
        "title": format!("reel by {owner}"),
        "description": "",
        "videoUrl": "https://res.cloudinary.com/demo/video/upload/v1/clip.mp4",
        "thumbnailUrl": "https://res.cloudinary.com/demo/video/upload/v1/clip.jpg",
        "publicId": "clip",
        "createdAt": at(minute),
        "views": views,
        "linkClicks": 0
    })
}

pub fn seed_video(store: &MemoryStore, id: &str, owner: &str, minute: u32, views: u64) {
    let mut post = base_post(owner, minute, views);
    post["contentType"] = json!("video");
    store.seed(&posts_collection(), id, fields(post));
}

pub fn seed_page(store: &MemoryStore, id: &str, owner: &str, minute: u32, category: &str) {
    seed_page_as(store, "page-reference", id, owner, minute, category);
}

/// Page-reference post written under the older `halaman` kind name
pub fn seed_legacy_page(store: &MemoryStore, id: &str, owner: &str, minute: u32, category: &str) {
    seed_page_as(store, "halaman", id, owner, minute, category);
}

fn seed_page_as(
    store: &MemoryStore,
    content_type: &str,
    id: &str,
    owner: &str,
    minute: u32,
    category: &str,
) {
    let mut post = base_post(owner, minute, 0);
    post["contentType"] = json!(content_type);
    post["pageName"] = json!("Corner Shop");
    post["category"] = json!(category);
    store.seed(&posts_collection(), id, fields(post));
}

pub fn seed_link(store: &MemoryStore, id: &str, owner: &str, minute: u32, url: &str) {
    let mut post = base_post(owner, minute, 0);
    post["contentType"] = json!("external-link");
    post["externalLink"] = json!(url);
    store.seed(&posts_collection(), id, fields(post));
}

pub fn seed_mark(store: &MemoryStore, id: &str, user: &str, post: &str) {
    store.seed(
        &saved_marks_collection(),
        id,
        fields(json!({ "userId": user, "reelId": post, "savedAt": at(0) })),
    );
}
