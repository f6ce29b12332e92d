use super::saved_marks_collection;
use crate::domain::{PostId, SavedMark, UserId};
use crate::error::{AppError, Result};
use crate::store::{to_fields, DocumentStore, NewDocument, Query, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Repository for viewer bookmarks
#[derive(Clone)]
pub struct SavedMarkRepository {
    store: Arc<dyn DocumentStore>,
}

impl SavedMarkRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Flip the saved state of `post_id` for `viewer`.
    ///
    /// When `currently_saved` every mark matching the pair is deleted, which
    /// also clears duplicates left behind by earlier races. Otherwise a single
    /// mark is inserted with a server timestamp.
    pub async fn toggle_saved(
        &self,
        viewer: &UserId,
        post_id: &PostId,
        currently_saved: bool,
    ) -> Result<()> {
        if currently_saved {
            let marks = self.find_marks(viewer, post_id).await?;
            if marks.len() > 1 {
                warn!(viewer_id = %viewer, post_id = %post_id, count = marks.len(), "removing duplicate saved marks");
            }
            for mark_id in marks {
                self.store
                    .delete(&saved_marks_collection(), &mark_id)
                    .await
                    .map_err(AppError::write)?;
            }
            info!(viewer_id = %viewer, post_id = %post_id, "post unsaved");
        } else {
            let mark = SavedMark {
                id: String::new(),
                user_id: viewer.clone(),
                post_id: post_id.clone(),
                saved_at: None,
            };
            let mut fields = to_fields(&mark).map_err(AppError::write)?;
            fields.remove("savedAt");

            self.store
                .insert(
                    &saved_marks_collection(),
                    NewDocument::new(fields).with_server_timestamp("savedAt"),
                )
                .await
                .map_err(AppError::write)?;
            info!(viewer_id = %viewer, post_id = %post_id, "post saved");
        }
        Ok(())
    }

    /// Ids of every mark for the (viewer, post) pair
    async fn find_marks(&self, viewer: &UserId, post_id: &PostId) -> Result<Vec<String>> {
        let docs = self
            .store
            .query(
                &Query::new(saved_marks_collection())
                    .where_eq("userId", viewer.as_str())
                    .where_eq("reelId", post_id.as_str()),
            )
            .await
            .map_err(AppError::write)?;
        Ok(docs.into_iter().map(|doc| doc.id).collect())
    }

    /// Marks of one viewer
    pub async fn list_marks(&self, viewer: &UserId) -> std::result::Result<Vec<SavedMark>, StoreError> {
        let docs = self
            .store
            .query(&Query::new(saved_marks_collection()).where_eq("userId", viewer.as_str()))
            .await?;

        docs.into_iter()
            .map(|doc| {
                let (id, mut mark): (String, SavedMark) = doc.decode()?;
                mark.id = id;
                Ok(mark)
            })
            .collect()
    }

    /// Post ids the viewer has saved. Any failure degrades to an empty set.
    pub async fn fetch_saved_ids(&self, viewer: &UserId) -> HashSet<PostId> {
        match self.list_marks(viewer).await {
            Ok(marks) => marks.into_iter().map(|mark| mark.post_id).collect(),
            Err(err) => {
                warn!(viewer_id = %viewer, "failed to fetch saved ids: {}", err);
                HashSet::new()
            }
        }
    }
}
