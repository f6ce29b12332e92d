//! Hosted identity service client (Identity Toolkit REST API)

use super::{AuthError, AuthState, IdentityProvider};
use crate::config::{FirebaseConfig, HttpConfig};
use crate::domain::Identity;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    id_token: String,
}

pub struct FirebaseAuthClient {
    http: Client,
    base_url: String,
    api_key: String,
    state: AuthState,
}

impl FirebaseAuthClient {
    pub fn new(firebase: &FirebaseConfig, http: &HttpConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(http.request_timeout_ms))
            .build()
            .map_err(|e| AuthError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http: client,
            base_url: firebase.identity_base_url.trim_end_matches('/').to_string(),
            api_key: firebase.api_key.clone(),
            state: AuthState::new(),
        })
    }

    async fn password_call(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let body: Value = response.json().await.unwrap_or_default();
            let code = body["error"]["message"].as_str().unwrap_or("UNKNOWN");
            warn!(endpoint, code, "identity service rejected request");
            return Err(AuthError::from_code(code));
        }

        let body: PasswordResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("malformed response: {e}")))?;

        let email = if body.email.is_empty() {
            email.to_string()
        } else {
            body.email
        };
        Ok(Identity::new(body.local_id, email).with_id_token(body.id_token))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuthClient {
    async fn register(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let identity = self.password_call("signUp", email, password).await?;
        self.state.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let identity = self
            .password_call("signInWithPassword", email, password)
            .await?;
        self.state.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        if let Some(identity) = self.state.current() {
            info!(user_id = %identity.uid, "signed out");
        }
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
