pub mod models;

pub use models::{
    Comment, ContentKind, Identity, NewPost, Post, PostContent, PostDraft, PostId, SavedMark,
    UserId,
};
