/// Per-viewer session state
///
/// Holds the signed-in viewer and the cached set of saved post ids. The cache
/// is loaded once per sign-in, cleared on sign-out and updated optimistically
/// by `toggle_saved`, which rolls back when the store write fails.
use crate::domain::{Identity, PostId, UserId};
use crate::error::{AppError, Result};
use crate::repository::SavedMarkRepository;
use crate::store::DocumentStore;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct SessionState {
    viewer: Option<Identity>,
    saved: HashSet<PostId>,
}

pub struct SessionContext {
    state: RwLock<SessionState>,
    in_flight: Mutex<HashSet<(UserId, PostId)>>,
    saved_marks: SavedMarkRepository,
    ready: watch::Sender<Option<UserId>>,
}

/// Releases the in-flight slot of one toggle, including on early return
struct InFlightGuard<'a> {
    slots: &'a Mutex<HashSet<(UserId, PostId)>>,
    key: (UserId, PostId),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.slots.lock().remove(&self.key);
    }
}

impl SessionContext {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let (ready, _) = watch::channel(None);
        Self {
            state: RwLock::new(SessionState::default()),
            in_flight: Mutex::new(HashSet::new()),
            saved_marks: SavedMarkRepository::new(store),
            ready,
        }
    }

    pub fn viewer(&self) -> Option<Identity> {
        self.state.read().viewer.clone()
    }

    pub fn is_saved(&self, post_id: &PostId) -> bool {
        self.state.read().saved.contains(post_id)
    }

    pub fn saved_ids(&self) -> HashSet<PostId> {
        self.state.read().saved.clone()
    }

    /// Replace the cached set, unless the viewer changed while it was loading
    fn replace_saved_for(&self, viewer: &UserId, ids: HashSet<PostId>) -> bool {
        let mut state = self.state.write();
        let current = state.viewer.as_ref().map(|v| &v.uid) == Some(viewer);
        if current {
            state.saved = ids;
        }
        current
    }

    /// Emits the viewer id each time an auth change has been fully applied;
    /// `None` after sign-out
    pub fn ready(&self) -> watch::Receiver<Option<UserId>> {
        self.ready.subscribe()
    }

    /// Apply a sign-in or sign-out. On sign-in the saved ids are loaded
    /// before `ready` fires; a failed load leaves the cache empty.
    pub async fn apply_auth_change(&self, identity: Option<Identity>) {
        match identity {
            Some(identity) => {
                let uid = identity.uid.clone();
                {
                    let mut state = self.state.write();
                    let same_viewer = state.viewer.as_ref().map(|v| &v.uid) == Some(&uid);
                    if !same_viewer {
                        state.saved.clear();
                    }
                    state.viewer = Some(identity);
                }

                let ids = self.saved_marks.fetch_saved_ids(&uid).await;
                let count = ids.len();
                if self.replace_saved_for(&uid, ids) {
                    info!(viewer_id = %uid, saved = count, "session ready");
                    self.ready.send_replace(Some(uid));
                } else {
                    debug!(viewer_id = %uid, "viewer changed while loading saved ids");
                }
            }
            None => {
                {
                    let mut state = self.state.write();
                    state.viewer = None;
                    state.saved.clear();
                }
                info!("session cleared");
                self.ready.send_replace(None);
            }
        }
    }

    /// Follow an identity channel until its sender goes away
    pub fn spawn_auth_listener(
        self: &Arc<Self>,
        mut identities: watch::Receiver<Option<Identity>>,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let initial = identities.borrow_and_update().clone();
            session.apply_auth_change(initial).await;

            while identities.changed().await.is_ok() {
                let identity = identities.borrow_and_update().clone();
                session.apply_auth_change(identity).await;
            }
            debug!("identity channel closed");
        })
    }

    /// Reload the saved ids from the store into the cache
    pub async fn refresh_saved(&self) -> HashSet<PostId> {
        let Some(viewer) = self.viewer() else {
            return HashSet::new();
        };
        let ids = self.saved_marks.fetch_saved_ids(&viewer.uid).await;
        self.replace_saved_for(&viewer.uid, ids.clone());
        ids
    }

    /// Flip the saved state of a post for the current viewer and return the
    /// new state.
    ///
    /// The cache flips before the write; on failure it is restored and the
    /// error returned. A second toggle of the same post while the first is
    /// still running is rejected with `Conflict`.
    pub async fn toggle_saved(&self, post_id: &PostId) -> Result<bool> {
        let viewer = self.viewer().ok_or(AppError::Unauthenticated)?;
        let key = (viewer.uid.clone(), post_id.clone());

        if !self.in_flight.lock().insert(key.clone()) {
            return Err(AppError::Conflict(format!("toggle of post {}", post_id)));
        }
        let _guard = InFlightGuard {
            slots: &self.in_flight,
            key,
        };

        let was_saved = {
            let mut state = self.state.write();
            let was_saved = state.saved.contains(post_id);
            if was_saved {
                state.saved.remove(post_id);
            } else {
                state.saved.insert(post_id.clone());
            }
            was_saved
        };

        match self
            .saved_marks
            .toggle_saved(&viewer.uid, post_id, was_saved)
            .await
        {
            Ok(()) => Ok(!was_saved),
            Err(err) => {
                warn!(viewer_id = %viewer.uid, post_id = %post_id, "toggle failed, rolling back: {}", err);
                let mut state = self.state.write();
                let still_viewer = state.viewer.as_ref().map(|v| &v.uid) == Some(&viewer.uid);
                if still_viewer {
                    if was_saved {
                        state.saved.insert(post_id.clone());
                    } else {
                        state.saved.remove(post_id);
                    }
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::saved_marks_collection;
    use crate::store::{Fields, MemoryStore};
    use serde_json::json;

    fn mark(user: &str, post: &str) -> Fields {
        json!({"userId": user, "reelId": post})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, SessionContext) {
        let store = Arc::new(MemoryStore::new());
        let session = SessionContext::new(store.clone());
        (store, session)
    }

    #[tokio::test]
    async fn test_sign_in_loads_saved_ids() {
        let (store, session) = setup();
        store.seed(&saved_marks_collection(), "m1", mark("u1", "p1"));
        store.seed(&saved_marks_collection(), "m2", mark("other", "p2"));

        let mut ready = session.ready();
        session
            .apply_auth_change(Some(Identity::new("u1", "a@example.com")))
            .await;

        assert!(ready.has_changed().unwrap());
        assert_eq!(*ready.borrow_and_update(), Some(UserId::from("u1")));
        assert!(session.is_saved(&PostId::from("p1")));
        assert!(!session.is_saved(&PostId::from("p2")));
    }

    #[tokio::test]
    async fn test_sign_out_clears_cache() {
        let (store, session) = setup();
        store.seed(&saved_marks_collection(), "m1", mark("u1", "p1"));
        session
            .apply_auth_change(Some(Identity::new("u1", "a@example.com")))
            .await;
        session.apply_auth_change(None).await;

        assert!(session.viewer().is_none());
        assert!(session.saved_ids().is_empty());
        assert_eq!(*session.ready().borrow(), None);
    }

    #[tokio::test]
    async fn test_toggle_requires_viewer() {
        let (_store, session) = setup();
        let err = session.toggle_saved(&PostId::from("p1")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_toggle_flips_and_persists() {
        let (store, session) = setup();
        session
            .apply_auth_change(Some(Identity::new("u1", "a@example.com")))
            .await;

        let post = PostId::from("p1");
        assert!(session.toggle_saved(&post).await.unwrap());
        assert!(session.is_saved(&post));
        assert_eq!(store.count(&saved_marks_collection()), 1);

        assert!(!session.toggle_saved(&post).await.unwrap());
        assert!(!session.is_saved(&post));
        assert_eq!(store.count(&saved_marks_collection()), 0);
    }

    #[tokio::test]
    async fn test_toggle_rolls_back_on_write_failure() {
        let (store, session) = setup();
        session
            .apply_auth_change(Some(Identity::new("u1", "a@example.com")))
            .await;
        store.set_fail_writes(true);

        let post = PostId::from("p1");
        let err = session.toggle_saved(&post).await.unwrap_err();
        assert!(matches!(err, AppError::Write(_)));
        assert!(!session.is_saved(&post));

        // slot released after failure
        store.set_fail_writes(false);
        assert!(session.toggle_saved(&post).await.unwrap());
    }
}
