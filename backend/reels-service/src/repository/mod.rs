/// Data access layer
///
/// Repositories wrap a shared [`DocumentStore`](crate::store::DocumentStore)
/// and translate between documents and domain models:
/// - `posts`: reel posts, counters, feed query shapes
/// - `saved_marks`: viewer bookmarks
/// - `comments`: per-post comment subcollection
pub mod comments;
pub mod posts;
pub mod saved_marks;

pub use comments::CommentRepository;
pub use posts::PostRepository;
pub use saved_marks::SavedMarkRepository;

use crate::store::CollectionPath;

pub const POSTS_COLLECTION: &str = "reels";
pub const SAVED_MARKS_COLLECTION: &str = "savedReels";
pub const COMMENTS_COLLECTION: &str = "comments";

pub fn posts_collection() -> CollectionPath {
    CollectionPath::root(POSTS_COLLECTION)
}

pub fn saved_marks_collection() -> CollectionPath {
    CollectionPath::root(SAVED_MARKS_COLLECTION)
}

pub fn comments_collection(post_id: &str) -> CollectionPath {
    posts_collection().sub(post_id, COMMENTS_COLLECTION)
}
