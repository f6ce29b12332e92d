use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use validator::{Validate, ValidationError};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Store-assigned identifier of a reel post
    PostId
);
string_id!(
    /// Identity-service user id
    UserId
);

/// Discriminator deciding which extra fields a post carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "page-reference", alias = "halaman")]
    PageReference,
    #[serde(rename = "external-link", alias = "link")]
    ExternalLink,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::PageReference => "page-reference",
            ContentKind::ExternalLink => "external-link",
        }
    }

    /// Every `contentType` value that decodes to this kind, current
    /// spelling first. Older posts were written with the legacy names.
    pub fn stored_spellings(&self) -> &'static [&'static str] {
        match self {
            ContentKind::Video => &["video"],
            ContentKind::PageReference => &["page-reference", "halaman"],
            ContentKind::ExternalLink => &["external-link", "link"],
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "video" => Ok(ContentKind::Video),
            "page-reference" | "halaman" => Ok(ContentKind::PageReference),
            "external-link" | "link" => Ok(ContentKind::ExternalLink),
            other => Err(format!("unknown content kind '{}'", other)),
        }
    }
}

/// Kind-specific payload of a post.
///
/// Stored flattened next to the common fields with `contentType` as the tag,
/// so a document only ever carries the fields of its own kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "contentType")]
pub enum PostContent {
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "page-reference", alias = "halaman", rename_all = "camelCase")]
    PageReference { page_name: String, category: String },
    #[serde(rename = "external-link", alias = "link")]
    ExternalLink {
        #[serde(rename = "externalLink")]
        target_url: String,
    },
}

impl PostContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            PostContent::Video => ContentKind::Video,
            PostContent::PageReference { .. } => ContentKind::PageReference,
            PostContent::ExternalLink { .. } => ContentKind::ExternalLink,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            PostContent::PageReference { category, .. } => Some(category),
            _ => None,
        }
    }

    pub fn target_url(&self) -> Option<&str> {
        match self {
            PostContent::ExternalLink { target_url } => Some(target_url),
            _ => None,
        }
    }
}

/// A single uploaded reel as read back from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Taken from the document name, never stored as a field
    #[serde(skip_serializing, default)]
    pub id: PostId,
    #[serde(rename = "userId")]
    pub owner_id: UserId,
    #[serde(rename = "userName", default)]
    pub owner_name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "videoUrl")]
    pub media_url: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(rename = "publicId", default)]
    pub asset_id: String,
    #[serde(flatten)]
    pub content: PostContent,
    /// `None` while the server timestamp is still pending
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub link_clicks: u64,
}

impl Post {
    pub fn kind(&self) -> ContentKind {
        self.content.kind()
    }
}

/// Fields written by `PostRepository::create_post`; counters and the
/// creation timestamp are filled in by the repository and the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    #[serde(rename = "userId")]
    pub owner_id: UserId,
    #[serde(rename = "userName")]
    pub owner_name: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "videoUrl")]
    pub media_url: String,
    pub thumbnail_url: String,
    #[serde(rename = "publicId")]
    pub asset_id: String,
    #[serde(flatten)]
    pub content: PostContent,
}

/// Upload form input, validated before any network call
#[derive(Debug, Clone, Default, Validate)]
#[validate(schema(function = "validate_kind_fields", skip_on_field_errors = false))]
pub struct PostDraft {
    #[validate(custom(function = "validate_title"))]
    pub title: String,
    pub description: String,
    pub kind: Option<ContentKind>,
    pub page_name: Option<String>,
    pub category: Option<String>,
    pub external_link: Option<String>,
}

impl PostDraft {
    pub fn video(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            kind: Some(ContentKind::Video),
            ..Default::default()
        }
    }

    pub fn page_reference(
        title: impl Into<String>,
        description: impl Into<String>,
        page_name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            kind: Some(ContentKind::PageReference),
            page_name: Some(page_name.into()),
            category: Some(category.into()),
            ..Default::default()
        }
    }

    pub fn external_link(
        title: impl Into<String>,
        description: impl Into<String>,
        target_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            kind: Some(ContentKind::ExternalLink),
            external_link: Some(target_url.into()),
            ..Default::default()
        }
    }

    /// Kind-specific payload; only the fields of the chosen kind are kept.
    /// Call after `validate()` succeeded.
    pub fn content(&self) -> Option<PostContent> {
        match self.kind? {
            ContentKind::Video => Some(PostContent::Video),
            ContentKind::PageReference => Some(PostContent::PageReference {
                page_name: non_blank(&self.page_name)?.to_string(),
                category: non_blank(&self.category)?.to_string(),
            }),
            ContentKind::ExternalLink => Some(PostContent::ExternalLink {
                target_url: non_blank(&self.external_link)?.to_string(),
            }),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(validation_error(
            "title",
            "Title, video and content type are required.",
        ));
    }
    Ok(())
}

fn validate_kind_fields(draft: &PostDraft) -> Result<(), ValidationError> {
    match draft.kind {
        None => Err(validation_error(
            "content_kind",
            "Title, video and content type are required.",
        )),
        Some(ContentKind::Video) => Ok(()),
        Some(ContentKind::PageReference) => {
            if non_blank(&draft.page_name).is_none() || non_blank(&draft.category).is_none() {
                return Err(validation_error(
                    "page_reference",
                    "Page name and category are required.",
                ));
            }
            Ok(())
        }
        Some(ContentKind::ExternalLink) => {
            let link = non_blank(&draft.external_link).ok_or_else(|| {
                validation_error("external_link", "External link is required.")
            })?;
            reqwest::Url::parse(link)
                .map(|_| ())
                .map_err(|_| validation_error("external_link", "External link is not a valid URL."))
        }
    }
}

/// A viewer's bookmark on a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMark {
    #[serde(skip_serializing, default)]
    pub id: String,
    pub user_id: UserId,
    #[serde(rename = "reelId")]
    pub post_id: PostId,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Comment stored under a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(skip_serializing, default)]
    pub id: String,
    pub user_id: UserId,
    #[serde(rename = "userName", default)]
    pub author_label: Option<String>,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn display_author(&self) -> &str {
        self.author_label
            .as_deref()
            .filter(|label| !label.is_empty())
            .unwrap_or("Anonymous")
    }
}

/// Signed-in user as reported by the identity service
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: UserId,
    pub email: String,
    id_token: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            id_token: None,
        }
    }

    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    /// Bearer token for the document store, when the provider issued one
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Label stored on posts and comments
    pub fn display_name(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_post(content: PostContent) -> NewPost {
        NewPost {
            owner_id: UserId::from("u1"),
            owner_name: "a@example.com".into(),
            title: "title".into(),
            description: String::new(),
            media_url: "https://cdn/v.mp4".into(),
            thumbnail_url: "https://cdn/v.jpg".into(),
            asset_id: "v".into(),
            content,
        }
    }

    #[test]
    fn test_page_reference_carries_only_its_fields() {
        let value = serde_json::to_value(new_post(PostContent::PageReference {
            page_name: "Shop".into(),
            category: "fashion".into(),
        }))
        .unwrap();

        assert_eq!(value["contentType"], "page-reference");
        assert_eq!(value["pageName"], "Shop");
        assert_eq!(value["category"], "fashion");
        assert!(value.get("externalLink").is_none());
    }

    #[test]
    fn test_external_link_carries_only_its_fields() {
        let value = serde_json::to_value(new_post(PostContent::ExternalLink {
            target_url: "https://example.com".into(),
        }))
        .unwrap();

        assert_eq!(value["contentType"], "external-link");
        assert_eq!(value["externalLink"], "https://example.com");
        assert!(value.get("pageName").is_none());
        assert!(value.get("category").is_none());
    }

    #[test]
    fn test_video_has_no_extra_fields() {
        let value = serde_json::to_value(new_post(PostContent::Video)).unwrap();
        assert_eq!(value["contentType"], "video");
        for field in ["pageName", "category", "externalLink"] {
            assert!(value.get(field).is_none(), "unexpected field {field}");
        }
    }

    #[test]
    fn test_post_reads_legacy_kind_values() {
        let post: Post = serde_json::from_value(json!({
            "userId": "u1",
            "userName": "a@example.com",
            "title": "t",
            "videoUrl": "https://cdn/v.mp4",
            "contentType": "halaman",
            "pageName": "Shop",
            "category": "food",
            "createdAt": "2024-05-01T10:00:00Z",
            "views": 7
        }))
        .unwrap();

        assert_eq!(post.kind(), ContentKind::PageReference);
        assert_eq!(post.content.category(), Some("food"));
        assert_eq!(post.views, 7);
        assert_eq!(post.link_clicks, 0);
        assert!(post.created_at.is_some());
    }

    #[test]
    fn test_draft_requires_category_for_page_reference() {
        let mut draft = PostDraft::page_reference("t", "", "Shop", "");
        assert!(draft.validate().is_err());

        draft.category = Some("food".into());
        assert!(draft.validate().is_ok());
        assert_eq!(
            draft.content(),
            Some(PostContent::PageReference {
                page_name: "Shop".into(),
                category: "food".into()
            })
        );
    }

    #[test]
    fn test_draft_rejects_malformed_link() {
        let draft = PostDraft::external_link("t", "", "not a url");
        assert!(draft.validate().is_err());

        let draft = PostDraft::external_link("t", "", "https://shop.example.com/item");
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_draft_drops_fields_of_other_kinds() {
        let mut draft = PostDraft::video("t", "d");
        draft.category = Some("food".into());
        draft.external_link = Some("https://example.com".into());

        assert!(draft.validate().is_ok());
        assert_eq!(draft.content(), Some(PostContent::Video));
    }

    #[test]
    fn test_draft_requires_title_and_kind() {
        let draft = PostDraft {
            title: String::new(),
            kind: Some(ContentKind::Video),
            ..Default::default()
        };
        assert!(draft.validate().is_err());

        let draft = PostDraft {
            title: "t".into(),
            ..Default::default()
        };
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_draft_rejects_blank_title() {
        for title in ["   ", "\t\n"] {
            let draft = PostDraft::video(title, "description");
            let errors = draft.validate().unwrap_err();
            assert!(errors.field_errors().contains_key("title"), "{title:?}");
        }
        assert!(PostDraft::video("  padded  ", "").validate().is_ok());
    }

    #[test]
    fn test_stored_spellings_decode_to_their_kind() {
        for kind in [
            ContentKind::Video,
            ContentKind::PageReference,
            ContentKind::ExternalLink,
        ] {
            assert_eq!(kind.stored_spellings()[0], kind.as_str());
            for spelling in kind.stored_spellings() {
                assert_eq!(spelling.parse::<ContentKind>(), Ok(kind));
            }
        }
    }

    #[test]
    fn test_comment_author_falls_back() {
        let comment = Comment {
            id: "c".into(),
            user_id: UserId::from("u"),
            author_label: None,
            text: "hi".into(),
            created_at: None,
        };
        assert_eq!(comment.display_author(), "Anonymous");
    }

    #[test]
    fn test_identity_debug_redacts_token() {
        let identity = Identity::new("u", "a@example.com").with_id_token("secret");
        let debug = format!("{:?}", identity);
        assert!(!debug.contains("secret"));
        assert_eq!(identity.id_token(), Some("secret"));
    }
}
