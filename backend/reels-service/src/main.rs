/// Reels command-line client
///
/// Signs in, waits for the saved-id cache, runs one read command and prints
/// the result as JSON on stdout.
///
/// Usage:
///   REELS_EMAIL=... REELS_PASSWORD=... reels-service feed [category]
///   reels-service saved
///   reels-service analytics
///   reels-service watch <post-id>
///   reels-service toggle <post-id>
///   reels-service comment <post-id> <text>
///   reels-service publish <video-file> <title> [description]
///
/// Environment variables:
///   - REELS_EMAIL / REELS_PASSWORD: account to sign in with
///   - see `Config::from_env` for store, media and feed settings
use anyhow::{bail, Context, Result};
use reels_service::auth::{self, FirebaseAuthClient, IdentityProvider, LoginRequest};
use reels_service::domain::{Post, PostDraft, PostId};
use reels_service::media::{CloudinaryUploader, MediaFile};
use reels_service::repository::{CommentRepository, PostRepository};
use reels_service::services::{
    CommentService, FeedFilter, FeedService, Listing, PublishService, SessionContext, StatusBoard,
};
use reels_service::store::FirestoreStore;
use reels_service::{telemetry, Config};
use serde::Serialize;
use serde_json::json;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const READY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct PostOutput<'a> {
    id: &'a PostId,
    #[serde(flatten)]
    post: &'a Post,
}

fn posts_json(posts: &[Post]) -> serde_json::Value {
    let rows: Vec<PostOutput<'_>> = posts
        .iter()
        .map(|post| PostOutput { id: &post.id, post })
        .collect();
    json!(rows)
}

fn post_id_arg(args: &[String], command: &str) -> Result<PostId> {
    args.get(1)
        .map(|id| PostId::from(id.as_str()))
        .with_context(|| format!("usage: reels-service {command} <post-id>"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration loading failed: {}", e);
            bail!("failed to load configuration: {e}");
        }
    };
    info!(env = %config.app.env, "starting reels client");

    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("feed");

    let provider = FirebaseAuthClient::new(&config.firebase, &config.http)
        .context("failed to create identity client")?;
    let store = Arc::new(
        FirestoreStore::new(&config.firebase, &config.http, provider.subscribe())
            .context("failed to create document store client")?,
    );

    let session = Arc::new(SessionContext::new(store.clone()));
    let mut ready = session.ready();
    let listener = session.spawn_auth_listener(provider.subscribe());

    let request = LoginRequest {
        email: env::var("REELS_EMAIL").unwrap_or_default(),
        password: env::var("REELS_PASSWORD").unwrap_or_default(),
    };
    let identity = auth::login(&provider, &request)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    tokio::time::timeout(
        READY_TIMEOUT,
        ready.wait_for(|viewer| viewer.as_ref() == Some(&identity.uid)),
    )
    .await
    .context("timed out waiting for session")?
    .context("session listener stopped")?;

    let feed = FeedService::new(store.clone(), config.feed.clone());
    let status = StatusBoard::from_config(&config.status);

    let output = match command {
        "feed" => {
            let filter = FeedFilter::category(args.get(1).map(String::as_str).unwrap_or("all"));
            match Listing::from_result(feed.fetch_posts(&filter).await) {
                Listing::Items(posts) => posts_json(&posts),
                Listing::Empty => json!({ "empty": "No reels yet." }),
                Listing::Unavailable(msg) => json!({ "error": msg }),
            }
        }
        "saved" => match Listing::from_result(feed.saved_feed(&session).await) {
            Listing::Items(posts) => posts_json(&posts),
            Listing::Empty => json!({ "empty": "You have not saved any reels yet." }),
            Listing::Unavailable(msg) => json!({ "error": msg }),
        },
        "analytics" => match Listing::from_result(feed.analytics_feed(&identity.uid).await) {
            Listing::Items(posts) => posts_json(&posts),
            Listing::Empty => json!({ "empty": "You have not uploaded any reels yet." }),
            Listing::Unavailable(msg) => json!({ "error": msg }),
        },
        "watch" => {
            let post_id = post_id_arg(&args, "watch")?;
            match feed.watch(&session, &post_id).await {
                Ok(view) => {
                    let post = PostOutput {
                        id: &view.post.id,
                        post: &view.post,
                    };
                    let comments: Vec<_> = view
                        .comments
                        .items()
                        .iter()
                        .map(|c| {
                            json!({
                                "author": c.display_author(),
                                "text": c.text,
                                "createdAt": c.created_at,
                            })
                        })
                        .collect();
                    json!({
                        "post": post,
                        "saved": view.saved,
                        "comments": comments,
                    })
                }
                Err(e) => json!({ "error": e.user_message() }),
            }
        }
        "toggle" => {
            let post_id = post_id_arg(&args, "toggle")?;
            match session.toggle_saved(&post_id).await {
                Ok(true) => status.success("Reel saved."),
                Ok(false) => status.success("Reel removed from saved."),
                Err(e) => status.report(&e),
            }
            json!({ "saved": session.is_saved(&post_id), "status": status.current() })
        }
        "comment" => {
            let post_id = post_id_arg(&args, "comment")?;
            let text = args[2..].join(" ");
            let comments = CommentService::new(CommentRepository::new(store.clone()));
            match comments.add_comment(Some(&identity), &post_id, &text).await {
                Ok(_) => status.success("Comment added."),
                Err(e) => status.report(&e),
            }
            json!({ "status": status.current() })
        }
        "publish" => {
            let path = args
                .get(1)
                .context("usage: reels-service publish <video-file> <title> [description]")?;
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {path}"))?;
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone());
            let draft = PostDraft::video(
                args.get(2).cloned().unwrap_or_default(),
                args.get(3).cloned().unwrap_or_default(),
            );

            let uploader = CloudinaryUploader::new(&config.cloudinary, &config.http)
                .context("failed to create media uploader")?;
            let publish = PublishService::new(
                Arc::new(uploader),
                PostRepository::new(store.clone()),
                config.cloudinary.delivery_base_url.clone(),
            );
            let media = MediaFile::new(file_name, bytes);
            match publish.publish(Some(&identity), &draft, Some(media)).await {
                Ok(post_id) => {
                    status.success("Reel uploaded.");
                    json!({ "id": post_id, "status": status.current() })
                }
                Err(e) => {
                    status.report(&e);
                    json!({ "status": status.current() })
                }
            }
        }
        other => bail!(
            "unknown command '{other}', expected feed|saved|analytics|watch|toggle|comment|publish"
        ),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    provider
        .logout()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    listener.abort();
    Ok(())
}
