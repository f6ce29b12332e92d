use crate::domain::{Comment, Identity, PostId};
use crate::error::{AppError, Result};
use crate::repository::CommentRepository;

pub struct CommentService {
    comments: CommentRepository,
}

impl CommentService {
    pub fn new(comments: CommentRepository) -> Self {
        Self { comments }
    }

    /// Add a comment as `viewer`. Blank text is rejected before any write.
    pub async fn add_comment(
        &self,
        viewer: Option<&Identity>,
        post_id: &PostId,
        text: &str,
    ) -> Result<String> {
        let viewer = viewer.ok_or(AppError::Unauthenticated)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Comment cannot be empty.".to_string()));
        }
        self.comments.create_comment(post_id, viewer, text).await
    }

    /// Comments oldest first
    pub async fn list_comments(&self, post_id: &PostId) -> Result<Vec<Comment>> {
        self.comments.get_comments_by_post(post_id).await
    }
}
