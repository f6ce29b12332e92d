use super::posts_collection;
use crate::domain::{ContentKind, NewPost, Post, PostId, UserId};
use crate::error::{AppError, Result};
use crate::store::{to_fields, Direction, Document, DocumentStore, NewDocument, Query};
use futures::future::try_join_all;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CREATED_AT: &str = "createdAt";
const VIEWS: &str = "views";
const LINK_CLICKS: &str = "linkClicks";

/// Repository for reel posts
#[derive(Clone)]
pub struct PostRepository {
    store: Arc<dyn DocumentStore>,
}

impl PostRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Write a new post with zeroed counters and a server-assigned timestamp.
    /// Kind-specific fields come from `post.content`, so only the fields of
    /// its own kind are written.
    pub async fn create_post(&self, post: &NewPost) -> Result<PostId> {
        let mut fields = to_fields(post).map_err(AppError::write)?;
        fields.insert(VIEWS.to_string(), Value::from(0));
        fields.insert(LINK_CLICKS.to_string(), Value::from(0));

        let id = self
            .store
            .insert(
                &posts_collection(),
                NewDocument::new(fields).with_server_timestamp(CREATED_AT),
            )
            .await
            .map_err(AppError::write)?;

        info!(post_id = %id, owner_id = %post.owner_id, kind = %post.content.kind(), "post created");
        Ok(PostId::new(id))
    }

    /// Find a post by ID
    pub async fn find_post(&self, post_id: &PostId) -> Result<Option<Post>> {
        let doc = self
            .store
            .get(&posts_collection(), post_id.as_str())
            .await
            .map_err(AppError::read)?;

        doc.map(decode_post).transpose()
    }

    /// All posts of one owner, newest first
    pub async fn find_by_owner(&self, owner_id: &UserId) -> Result<Vec<Post>> {
        self.run(
            Query::new(posts_collection())
                .where_eq("userId", owner_id.as_str())
                .order_by(CREATED_AT, Direction::Descending),
        )
        .await
    }

    /// Page-reference posts of one category, newest first.
    ///
    /// Runs one equality query per stored spelling of the kind so posts
    /// written under the legacy name are included, then merges the results.
    pub async fn find_by_category(&self, category: &str) -> Result<Vec<Post>> {
        let queries = ContentKind::PageReference
            .stored_spellings()
            .iter()
            .map(|spelling| {
                self.run(
                    Query::new(posts_collection())
                        .where_eq("contentType", *spelling)
                        .where_eq("category", category)
                        .order_by(CREATED_AT, Direction::Descending),
                )
            });
        let batches = try_join_all(queries).await?;
        Ok(merge_newest_first(batches))
    }

    /// Posts whose id is in `ids`, newest first. `ids` must fit in one
    /// membership filter; the store rejects larger lists.
    pub async fn find_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>> {
        self.run(
            Query::new(posts_collection())
                .where_id_in(ids.iter().map(|id| id.as_str().to_string()))
                .order_by(CREATED_AT, Direction::Descending),
        )
        .await
    }

    /// Whole collection, newest first
    pub async fn find_all(&self) -> Result<Vec<Post>> {
        self.run(Query::new(posts_collection()).order_by(CREATED_AT, Direction::Descending))
            .await
    }

    async fn run(&self, query: Query) -> Result<Vec<Post>> {
        debug!(filters = query.filters.len(), "querying posts");
        let docs = self.store.query(&query).await.map_err(AppError::read)?;

        // A single malformed document must not take the whole feed down
        Ok(docs
            .into_iter()
            .filter_map(|doc| match decode_post(doc) {
                Ok(post) => Some(post),
                Err(err) => {
                    warn!("skipping undecodable post: {}", err);
                    None
                }
            })
            .collect())
    }

    /// Best-effort `views += 1`; failures are logged only
    pub async fn increment_view_count(&self, post_id: &PostId) {
        self.increment(post_id, VIEWS).await
    }

    /// Best-effort `linkClicks += 1`; failures are logged only
    pub async fn increment_link_clicks(&self, post_id: &PostId) {
        self.increment(post_id, LINK_CLICKS).await
    }

    async fn increment(&self, post_id: &PostId, field: &str) {
        if let Err(err) = self
            .store
            .increment(&posts_collection(), post_id.as_str(), field, 1)
            .await
        {
            warn!(post_id = %post_id, field, "counter increment failed: {}", err);
        }
    }

    /// Delete a post by ID. Saved marks and comments pointing at it are left
    /// in place; saved feeds drop stale marks when they render.
    pub async fn delete_post(&self, post_id: &PostId) -> Result<()> {
        self.store
            .delete(&posts_collection(), post_id.as_str())
            .await
            .map_err(AppError::write)?;
        info!(post_id = %post_id, "post deleted");
        Ok(())
    }
}

fn decode_post(doc: Document) -> Result<Post> {
    let (id, mut post): (String, Post) = doc.decode().map_err(AppError::read)?;
    post.id = PostId::new(id);
    Ok(post)
}

struct Head {
    post: Post,
    batch: usize,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    // Max-heap: newest first, lower batch index wins ties
    fn cmp(&self, other: &Self) -> Ordering {
        self.post
            .created_at
            .cmp(&other.post.created_at)
            .then_with(|| other.batch.cmp(&self.batch))
    }
}

/// K-way merge of batches that are each sorted newest first
pub fn merge_newest_first(batches: Vec<Vec<Post>>) -> Vec<Post> {
    let total = batches.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = batches.into_iter().map(Vec::into_iter).collect();
    let mut heap = BinaryHeap::with_capacity(iters.len());

    for (batch, iter) in iters.iter_mut().enumerate() {
        if let Some(post) = iter.next() {
            heap.push(Head { post, batch });
        }
    }

    let mut merged = Vec::with_capacity(total);
    while let Some(Head { post, batch }) = heap.pop() {
        merged.push(post);
        if let Some(next) = iters[batch].next() {
            heap.push(Head { post: next, batch });
        }
    }
    merged
}
