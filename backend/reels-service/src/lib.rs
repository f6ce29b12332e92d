/// Reels Service Library
///
/// Client core of the reels short-video app: feed retrieval against a hosted
/// document store and reconciliation of each viewer's saved state.
///
/// # Modules
///
/// - `domain`: posts, saved marks, comments, identities
/// - `store`: document store boundary with hosted and in-process backends
/// - `repository`: collection-level data access
/// - `services`: feed composition, session, publishing, comments, notices
/// - `auth`: identity provider boundary and form validation
/// - `media`: media upload boundary
/// - `error`: Error types and handling
/// - `config`: Configuration management
/// - `telemetry`: tracing setup
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod media;
pub mod repository;
pub mod services;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
