/// Feed composition
///
/// Decides which query shape answers a feed request and how partial results
/// are merged or filtered on the client:
/// - owner, category and default feeds map onto one ordered query each
/// - ID-set feeds use the store's membership filter when the set fits, and
///   otherwise fall back to a full scan or batched queries (see `IdSetStrategy`)
/// - the saved feed re-filters against the viewer's saved ids
/// - analytics re-sorts an owner's posts by views with a stable sort
use crate::config::{FeedConfig, IdSetStrategy};
use crate::domain::{Comment, Post, PostId, UserId};
use crate::error::{AppError, Result};
use crate::repository::posts::merge_newest_first;
use crate::repository::{CommentRepository, PostRepository};
use crate::services::session::SessionContext;
use crate::store::DocumentStore;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Category value meaning "no category filter"
pub const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFilter {
    /// Every post
    All,
    /// Posts of one owner
    Owner(UserId),
    /// Page-reference posts of one category
    Category(String),
    /// Posts with the listed ids
    Ids(Vec<PostId>),
}

impl FeedFilter {
    /// Category filter; the `all` sentinel means no filter
    pub fn category(category: &str) -> Self {
        let category = category.trim();
        if category.is_empty() || category == ALL_CATEGORIES {
            FeedFilter::All
        } else {
            FeedFilter::Category(category.to_string())
        }
    }

    /// Pick a filter from optional inputs. Precedence is owner, then a
    /// category other than `all`, then a non-empty id list, then all posts.
    pub fn from_parts(
        category: Option<&str>,
        owner: Option<&UserId>,
        ids: Option<&[PostId]>,
    ) -> Self {
        if let Some(owner) = owner {
            return FeedFilter::Owner(owner.clone());
        }
        if let Some(filter @ FeedFilter::Category(_)) = category.map(FeedFilter::category) {
            return filter;
        }
        match ids {
            Some(ids) if !ids.is_empty() => FeedFilter::Ids(ids.to_vec()),
            _ => FeedFilter::All,
        }
    }
}

/// Render state of a list: items, an explicit empty state, or a read failure
/// shown in place of the list
#[derive(Debug, Clone, PartialEq)]
pub enum Listing<T> {
    Items(Vec<T>),
    Empty,
    Unavailable(String),
}

impl<T> Listing<T> {
    pub fn from_result(result: Result<Vec<T>>) -> Self {
        match result {
            Ok(items) if items.is_empty() => Listing::Empty,
            Ok(items) => Listing::Items(items),
            Err(err) => Listing::Unavailable(err.user_message()),
        }
    }

    pub fn items(&self) -> &[T] {
        match self {
            Listing::Items(items) => items,
            _ => &[],
        }
    }
}

/// Everything the watch page shows for one post
#[derive(Debug, Clone, PartialEq)]
pub struct WatchView {
    pub post: Post,
    pub saved: bool,
    pub comments: Listing<Comment>,
}

pub struct FeedService {
    posts: PostRepository,
    comments: CommentRepository,
    config: FeedConfig,
}

impl FeedService {
    pub fn new(store: Arc<dyn DocumentStore>, config: FeedConfig) -> Self {
        Self {
            posts: PostRepository::new(store.clone()),
            comments: CommentRepository::new(store),
            config,
        }
    }

    pub fn posts(&self) -> &PostRepository {
        &self.posts
    }

    pub async fn fetch_posts(&self, filter: &FeedFilter) -> Result<Vec<Post>> {
        debug!(?filter, "fetching feed");
        match filter {
            FeedFilter::All => self.posts.find_all().await,
            FeedFilter::Owner(owner) => self.posts.find_by_owner(owner).await,
            FeedFilter::Category(category) if category == ALL_CATEGORIES => {
                self.posts.find_all().await
            }
            FeedFilter::Category(category) => self.posts.find_by_category(category).await,
            FeedFilter::Ids(ids) => self.fetch_by_ids(ids).await,
        }
    }

    /// Posts with the given ids, newest first
    pub async fn fetch_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>> {
        let mut seen = HashSet::new();
        let ids: Vec<PostId> = ids.iter().filter(|id| seen.insert(*id)).cloned().collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let limit = self.config.membership_limit.max(1);
        if ids.len() <= limit {
            return self.posts.find_by_ids(&ids).await;
        }

        match self.config.id_set_strategy {
            IdSetStrategy::FullScan => {
                info!(count = ids.len(), limit, "id set exceeds membership limit, scanning collection");
                let wanted: HashSet<&PostId> = ids.iter().collect();
                let all = self.posts.find_all().await?;
                Ok(all.into_iter().filter(|post| wanted.contains(&post.id)).collect())
            }
            IdSetStrategy::Batched => {
                debug!(count = ids.len(), limit, "id set exceeds membership limit, batching");
                let batches =
                    try_join_all(ids.chunks(limit).map(|chunk| self.posts.find_by_ids(chunk)))
                        .await?;
                Ok(merge_newest_first(batches))
            }
        }
    }

    /// The signed-in viewer's saved posts, newest first.
    ///
    /// Refreshes the session's saved-id cache first. Marks whose post no
    /// longer exists are dropped from the result but not cleaned up.
    pub async fn saved_feed(&self, session: &SessionContext) -> Result<Vec<Post>> {
        if session.viewer().is_none() {
            return Err(AppError::Unauthenticated);
        }

        let saved = session.refresh_saved().await;
        if saved.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<PostId> = saved.iter().cloned().collect();
        ids.sort();
        let posts = self.fetch_posts(&FeedFilter::Ids(ids)).await?;
        Ok(posts
            .into_iter()
            .filter(|post| saved.contains(&post.id))
            .collect())
    }

    /// An owner's posts, most viewed first; ties keep the newest-first order
    pub async fn analytics_feed(&self, owner: &UserId) -> Result<Vec<Post>> {
        let mut posts = self.fetch_posts(&FeedFilter::Owner(owner.clone())).await?;
        posts.sort_by(|a, b| b.views.cmp(&a.views));
        Ok(posts)
    }

    /// Load one post for the watch page. Counts a view alongside loading the
    /// comments; the view increment never fails the call.
    pub async fn watch(&self, session: &SessionContext, post_id: &PostId) -> Result<WatchView> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        let ((), comments) = tokio::join!(
            self.posts.increment_view_count(post_id),
            self.comments.get_comments_by_post(post_id)
        );

        Ok(WatchView {
            saved: session.is_saved(post_id),
            post,
            comments: Listing::from_result(comments),
        })
    }

    /// Fire-and-forget view count
    pub fn track_view(&self, post_id: &PostId) -> JoinHandle<()> {
        let posts = self.posts.clone();
        let post_id = post_id.clone();
        tokio::spawn(async move { posts.increment_view_count(&post_id).await })
    }

    /// Fire-and-forget click count; only external-link posts have a link.
    /// Returns the target URL to open together with the tracking task.
    pub fn track_link_click(&self, post: &Post) -> Option<(String, JoinHandle<()>)> {
        let target = post.content.target_url()?.to_string();
        let posts = self.posts.clone();
        let post_id = post.id.clone();
        let handle = tokio::spawn(async move { posts.increment_link_clicks(&post_id).await });
        Some((target, handle))
    }
}
