use super::comments_collection;
use crate::domain::{Comment, Identity, PostId};
use crate::error::{AppError, Result};
use crate::store::{to_fields, Direction, DocumentStore, NewDocument, Query};
use std::sync::Arc;
use tracing::info;

/// Repository for the comment subcollection of each post
#[derive(Clone)]
pub struct CommentRepository {
    store: Arc<dyn DocumentStore>,
}

impl CommentRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Append a comment; `text` must already be trimmed and non-empty
    pub async fn create_comment(
        &self,
        post_id: &PostId,
        author: &Identity,
        text: &str,
    ) -> Result<String> {
        let comment = Comment {
            id: String::new(),
            user_id: author.uid.clone(),
            author_label: Some(author.display_name().to_string()),
            text: text.to_string(),
            created_at: None,
        };
        let mut fields = to_fields(&comment).map_err(AppError::write)?;
        fields.remove("createdAt");

        let id = self
            .store
            .insert(
                &comments_collection(post_id.as_str()),
                NewDocument::new(fields).with_server_timestamp("createdAt"),
            )
            .await
            .map_err(AppError::write)?;

        info!(post_id = %post_id, comment_id = %id, "comment added");
        Ok(id)
    }

    /// Comments of a post, oldest first
    pub async fn get_comments_by_post(&self, post_id: &PostId) -> Result<Vec<Comment>> {
        let docs = self
            .store
            .query(
                &Query::new(comments_collection(post_id.as_str()))
                    .order_by("createdAt", Direction::Ascending),
            )
            .await
            .map_err(AppError::read)?;

        docs.into_iter()
            .map(|doc| {
                let (id, mut comment): (String, Comment) = doc.decode().map_err(AppError::read)?;
                comment.id = id;
                Ok(comment)
            })
            .collect()
    }
}
