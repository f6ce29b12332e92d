use crate::domain::{Identity, NewPost, PostDraft, PostId};
use crate::error::{AppError, Result};
use crate::media::{MediaFile, MediaUploader};
use crate::repository::PostRepository;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

const MISSING_FIELDS: &str = "Title, video and content type are required.";

/// Upload flow: validate the draft, push the media, then write the post.
/// Nothing is written when validation or the upload fails.
pub struct PublishService {
    uploader: Arc<dyn MediaUploader>,
    posts: PostRepository,
    delivery_base_url: String,
}

impl PublishService {
    pub fn new(
        uploader: Arc<dyn MediaUploader>,
        posts: PostRepository,
        delivery_base_url: impl Into<String>,
    ) -> Self {
        Self {
            uploader,
            posts,
            delivery_base_url: delivery_base_url.into(),
        }
    }

    pub async fn publish(
        &self,
        viewer: Option<&Identity>,
        draft: &PostDraft,
        media: Option<MediaFile>,
    ) -> Result<PostId> {
        let viewer = viewer.ok_or(AppError::Unauthenticated)?;
        let media = media
            .filter(|file| !file.bytes.is_empty())
            .ok_or_else(|| AppError::Validation(MISSING_FIELDS.to_string()))?;

        draft.validate()?;
        let content = draft
            .content()
            .ok_or_else(|| AppError::Validation(MISSING_FIELDS.to_string()))?;

        debug!(file = %media.file_name, size = media.bytes.len(), "uploading media");
        let uploaded = self.uploader.upload(media).await?;

        let post = NewPost {
            owner_id: viewer.uid.clone(),
            owner_name: viewer.display_name().to_string(),
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            thumbnail_url: uploaded.thumbnail_url(&self.delivery_base_url),
            media_url: uploaded.url,
            asset_id: uploaded.asset_id,
            content,
        };

        let post_id = self.posts.create_post(&post).await?;
        info!(post_id = %post_id, owner_id = %viewer.uid, "post published");
        Ok(post_id)
    }
}
