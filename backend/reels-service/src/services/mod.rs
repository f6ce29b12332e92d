/// Business logic layer
///
/// - `feed`: feed composition, saved feed, analytics, watch view
/// - `session`: signed-in viewer and saved-id cache with optimistic toggles
/// - `publish`: draft validation, media upload, post creation
/// - `comments`: comment posting and listing
/// - `status`: transient success/error notices
pub mod comments;
pub mod feed;
pub mod publish;
pub mod session;
pub mod status;

pub use comments::CommentService;
pub use feed::{FeedFilter, FeedService, Listing, WatchView};
pub use publish::PublishService;
pub use session::SessionContext;
pub use status::{NoticeKind, StatusBoard, StatusNotice};
