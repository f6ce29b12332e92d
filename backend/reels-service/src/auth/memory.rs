//! In-process identity provider for offline runs and tests

use super::{AuthError, AuthState, IdentityProvider};
use crate::domain::{Identity, UserId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;
use validator::ValidateEmail;

/// Consecutive failed logins before an account is throttled
const MAX_FAILED_ATTEMPTS: u32 = 5;
const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    uid: UserId,
    password: String,
    failed_attempts: u32,
}

#[derive(Default)]
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    state: AuthState,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn register(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        if !email.validate_email() {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let key = email.to_ascii_lowercase();
        let identity = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&key) {
                return Err(AuthError::EmailInUse);
            }
            let uid = UserId::new(uuid::Uuid::new_v4().simple().to_string());
            accounts.insert(
                key,
                Account {
                    uid: uid.clone(),
                    password: password.to_string(),
                    failed_attempts: 0,
                },
            );
            Identity::new(uid, email)
        };

        self.state.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        if !email.validate_email() {
            return Err(AuthError::InvalidEmail);
        }

        let identity = {
            let mut accounts = self.accounts.lock();
            let account = accounts
                .get_mut(&email.to_ascii_lowercase())
                .ok_or(AuthError::UserNotFound)?;

            if account.failed_attempts >= MAX_FAILED_ATTEMPTS {
                return Err(AuthError::TooManyRequests);
            }
            if account.password != password {
                account.failed_attempts += 1;
                return Err(AuthError::WrongPassword);
            }
            account.failed_attempts = 0;
            Identity::new(account.uid.clone(), email)
        };

        self.state.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.state.publish(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }

    fn current(&self) -> Option<Identity> {
        self.state.current()
    }
}
