/// Session/auth boundary
///
/// The hosted identity service is reached through [`IdentityProvider`].
/// Every provider owns an [`AuthState`], a watch channel carrying the current
/// identity (or none); the session context and the document store client
/// subscribe to it.
use crate::domain::Identity;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use validator::Validate;

pub mod firebase;
pub mod memory;

pub use firebase::FirebaseAuthClient;
pub use memory::MemoryIdentityProvider;

/// Identity service failures, grouped into user-facing categories
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,

    #[error("email already in use")]
    EmailInUse,

    #[error("password too weak")]
    WeakPassword,

    #[error("user not found")]
    UserNotFound,

    #[error("wrong password")]
    WrongPassword,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("too many requests")]
    TooManyRequests,

    #[error("not signed in")]
    NotSignedIn,

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("identity service unreachable: {0}")]
    Transport(String),
}

impl AuthError {
    /// Map a provider error code. Accepts both the REST codes
    /// (`EMAIL_EXISTS`, `WEAK_PASSWORD : ...`) and the SDK style
    /// (`auth/email-already-in-use`).
    pub fn from_code(code: &str) -> Self {
        let code = code.split(" : ").next().unwrap_or(code).trim();
        match code {
            "EMAIL_EXISTS" | "auth/email-already-in-use" => AuthError::EmailInUse,
            "INVALID_EMAIL" | "auth/invalid-email" => AuthError::InvalidEmail,
            "WEAK_PASSWORD" | "auth/weak-password" => AuthError::WeakPassword,
            "EMAIL_NOT_FOUND" | "auth/user-not-found" => AuthError::UserNotFound,
            "INVALID_PASSWORD" | "auth/wrong-password" => AuthError::WrongPassword,
            "INVALID_LOGIN_CREDENTIALS" | "auth/invalid-credential" => {
                AuthError::InvalidCredentials
            }
            "TOO_MANY_ATTEMPTS_TRY_LATER" | "auth/too-many-requests" => AuthError::TooManyRequests,
            other => AuthError::Provider(other.to_string()),
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail => "Invalid email format.",
            AuthError::EmailInUse => "Email is already registered.",
            AuthError::WeakPassword => "Password is too weak.",
            AuthError::UserNotFound | AuthError::WrongPassword | AuthError::InvalidCredentials => {
                "Wrong email or password."
            }
            AuthError::TooManyRequests => "Too many login attempts. Try again later.",
            AuthError::NotSignedIn => "Please sign in first.",
            AuthError::Provider(_) | AuthError::Transport(_) => {
                "Authentication failed. Please try again."
            }
        }
    }
}

/// Broadcasts the current identity to every subscriber
#[derive(Debug)]
pub struct AuthState {
    tx: watch::Sender<Option<Identity>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn publish(&self, identity: Option<Identity>) {
        self.tx.send_replace(identity);
    }
}

/// Email/password identity service
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account; the new user is signed in on success
    async fn register(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn logout(&self) -> Result<(), AuthError>;

    /// Stream of "current identity or none"
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;

    fn current(&self) -> Option<Identity>;
}

/// Sign-up form, checked before the identity service is contacted
#[derive(Debug, Clone, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "All fields are required."))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters."))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Password confirmation does not match."))]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email and password are required."))]
    pub email: String,
    #[validate(length(min = 1, message = "Email and password are required."))]
    pub password: String,
}

/// Validate the form, then register through `provider`
pub async fn register(
    provider: &dyn IdentityProvider,
    request: &RegisterRequest,
) -> crate::Result<Identity> {
    request.validate()?;
    let identity = provider.register(request.email.trim(), &request.password).await?;
    tracing::info!(user_id = %identity.uid, "account registered");
    Ok(identity)
}

/// Validate the form, then sign in through `provider`
pub async fn login(provider: &dyn IdentityProvider, request: &LoginRequest) -> crate::Result<Identity> {
    request.validate()?;
    let identity = provider.login(request.email.trim(), &request.password).await?;
    tracing::info!(user_id = %identity.uid, "signed in");
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_maps_rest_and_sdk_codes() {
        assert_eq!(AuthError::from_code("EMAIL_EXISTS"), AuthError::EmailInUse);
        assert_eq!(
            AuthError::from_code("WEAK_PASSWORD : Password should be at least 6 characters"),
            AuthError::WeakPassword
        );
        assert_eq!(AuthError::from_code("auth/user-not-found"), AuthError::UserNotFound);
        assert_eq!(
            AuthError::from_code("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"),
            AuthError::TooManyRequests
        );
        assert_eq!(
            AuthError::from_code("USER_DISABLED"),
            AuthError::Provider("USER_DISABLED".into())
        );
    }

    #[test]
    fn test_credential_errors_share_message() {
        let msg = AuthError::UserNotFound.user_message();
        assert_eq!(AuthError::WrongPassword.user_message(), msg);
        assert_eq!(AuthError::InvalidCredentials.user_message(), msg);
        assert_ne!(AuthError::TooManyRequests.user_message(), msg);
    }

    #[test]
    fn test_register_request_validation() {
        let mut req = RegisterRequest {
            email: "a@example.com".into(),
            password: "12345".into(),
            confirm_password: "12345".into(),
        };
        assert!(req.validate().is_err());

        req.password = "123456".into();
        assert!(req.validate().is_err());

        req.confirm_password = "123456".into();
        assert!(req.validate().is_ok());

        req.email = String::new();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_auth_state_broadcasts() {
        let state = AuthState::new();
        let rx = state.subscribe();
        assert!(rx.borrow().is_none());

        state.publish(Some(Identity::new("u1", "a@example.com")));
        assert_eq!(rx.borrow().as_ref().map(|i| i.uid.as_str()), Some("u1"));
        assert!(state.current().is_some());
    }
}
