//! Integration tests for Crave.
//!
//! The full router (sessions, activity tracking, extractors, error mapping)
//! runs in-process against an in-memory SQLite database and the outbox mail
//! transport, so no server or SMTP relay is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p crave-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `auth_flow` - Registration, login, lockout, 2FA, password reset
//! - `session_timeout` - Idle-session watchdog as seen over HTTP
//! - `ordering` - Catalog, cart, checkout and order history
//! - `admin` - Back office, role checks and analytics

#![allow(clippy::missing_panics_doc)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use crave_core::{Email, Price, UserRole};
use crave_server::config::AppConfig;
use crave_server::db::{FoodRepository, UserRepository, create_memory_pool};
use crave_server::middleware::{SESSION_COOKIE_NAME, create_session_layer};
use crave_server::models::User;
use crave_server::models::food::{FoodDraft, FoodItem};
use crave_server::models::user::NewUser;
use crave_server::routes;
use crave_server::services::auth::hash_password;
use crave_server::services::EmailService;
use crave_server::state::AppState;

/// Password that passes the strength rules.
pub const PASSWORD: &str = "correct-horse-42";

/// An application wired up for tests.
pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    /// Application with default configuration.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Application with configuration adjusted by `configure`.
    pub async fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let pool = create_memory_pool()
            .await
            .expect("failed to create in-memory database");

        let mut config = AppConfig::with_defaults("sqlite::memory:".to_string().into());
        configure(&mut config);

        let email = EmailService::outbox(&config.base_url);
        let session_layer = create_session_layer(MemoryStore::default(), &config);
        let state = AppState::new(config, pool, email);
        let router = routes::app(state.clone(), session_layer);

        Self { state, router }
    }

    /// A client with its own cookie jar.
    #[must_use]
    pub fn client(&self) -> TestClient {
        TestClient {
            router: self.router.clone(),
            cookie: None,
        }
    }

    /// The most recent 6-digit code mailed to `email`.
    #[must_use]
    pub fn last_code(&self, email: &str) -> String {
        let messages = self.state.email().outbox_messages();
        let message = messages
            .iter()
            .rev()
            .find(|m| m.to == email)
            .unwrap_or_else(|| panic!("no mail sent to {email}"));
        message
            .text_body
            .split(|c: char| !c.is_ascii_digit())
            .find(|word| word.len() == 6)
            .expect("no code in message")
            .to_owned()
    }

    /// Subjects of every message sent to `email`, oldest first.
    #[must_use]
    pub fn subjects_for(&self, email: &str) -> Vec<String> {
        self.state
            .email()
            .outbox_messages()
            .into_iter()
            .filter(|m| m.to == email)
            .map(|m| m.subject)
            .collect()
    }

    /// Insert a verified account with [`PASSWORD`].
    pub async fn create_user(&self, email: &str, role: UserRole) -> User {
        UserRepository::new(self.state.pool())
            .create(&NewUser {
                email: Email::parse(email).expect("valid test email"),
                password_hash: hash_password(PASSWORD).expect("hashable password"),
                role,
                full_name: Some("Test User".to_string()),
                email_verified: true,
            })
            .await
            .expect("failed to insert user")
    }

    /// Insert a menu item priced in cents.
    pub async fn add_food(&self, name: &str, category: &str, cents: i64, available: bool) -> FoodItem {
        FoodRepository::new(self.state.pool())
            .create(&FoodDraft {
                name: name.to_string(),
                description: format!("House {}", name.to_lowercase()),
                category: category.to_string(),
                price: Price::from_cents(cents).expect("non-negative price"),
                image_path: None,
                is_available: available,
            })
            .await
            .expect("failed to insert food")
    }

    /// A client signed in as a fresh verified account.
    pub async fn signed_in(&self, email: &str, role: UserRole) -> TestClient {
        self.create_user(email, role).await;
        let mut client = self.client();
        let response = client
            .post(
                "/api/auth/login",
                &serde_json::json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        client
    }
}

/// A response with its body parsed as JSON (`Value::Null` when empty or not JSON).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// In-process HTTP client that keeps the session cookie between requests.
pub struct TestClient {
    router: Router,
    cookie: Option<String>,
}

impl TestClient {
    pub async fn get(&mut self, path: &str) -> TestResponse {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&mut self, path: &str, body: &Value) -> TestResponse {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&mut self, path: &str, body: &Value) -> TestResponse {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub async fn put(&mut self, path: &str, body: &Value) -> TestResponse {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&mut self, path: &str) -> TestResponse {
        self.send(Method::DELETE, path, None).await
    }

    /// Whether the jar currently holds a session cookie.
    #[must_use]
    pub const fn has_session_cookie(&self) -> bool {
        self.cookie.is_some()
    }

    async fn send(&mut self, method: Method, path: &str, body: Option<&Value>) -> TestResponse {
        let mut request = Request::builder().method(method).uri(path);
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        self.store_cookie(response.headers());

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    fn store_cookie(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            let Some(pair) = value.split(';').next() else {
                continue;
            };
            let Some((name, cookie_value)) = pair.split_once('=') else {
                continue;
            };
            if name.trim() != SESSION_COOKIE_NAME {
                continue;
            }
            let removed = cookie_value.is_empty() || value.contains("Max-Age=0");
            self.cookie = if removed {
                None
            } else {
                Some(pair.trim().to_owned())
            };
        }
    }
}
