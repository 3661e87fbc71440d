//! Shared setup for theatre-service integration tests.
//!
//! Routers run over `InMemoryUserStore` and `MockEmailService` and are driven
//! in-process with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use service_core::config::Config as CommonConfig;
use std::sync::Arc;
use theatre_service::{
    build_router,
    config::{
        AppConfig, DatabaseConfig, Environment, JwtConfig, RateLimitConfig, SecurityConfig,
        SmtpConfig, StoreBackend, SwaggerConfig, SwaggerMode, TwoFactorConfig,
    },
    models::{Role, User},
    services::{InMemoryUserStore, MockEmailService, UserStore},
    utils::{hash_password, Password},
    AppState,
};
use tower::ServiceExt;

pub const PASSWORD: &str = "p";

pub fn test_config() -> AppConfig {
    AppConfig {
        common: CommonConfig::default(),
        environment: Environment::Dev,
        service_name: "theatre-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        public_base_url: "http://localhost:8080".to_string(),
        store: StoreBackend::Memory,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
        },
        jwt: JwtConfig {
            secret: "integration-test-secret-integration-test-secret".to_string(),
            issuer: "theatre-service".to_string(),
            token_expiry_minutes: 60,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            user: String::new(),
            password: String::new(),
            from: "Theatre <no-reply@theatre.test>".to_string(),
        },
        two_factor: TwoFactorConfig {
            code_length: 6,
            code_ttl_seconds: 300,
            max_attempts: 3,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allow_admin_registration: false,
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            register_attempts: 1000,
            register_window_seconds: 60,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryUserStore>,
    pub email: Arc<MockEmailService>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(InMemoryUserStore::new());
        let email = Arc::new(MockEmailService::new());
        let state = AppState::new(config, store.clone(), email.clone())
            .expect("Failed to build app state");
        let router = build_router(state.clone()).expect("Failed to build router");

        Self {
            router,
            state,
            store,
            email,
        }
    }

    /// Sends one request from `client_ip` and returns status and JSON body.
    pub async fn send_from(
        &self,
        client_ip: &str,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", client_ip);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        self.send_from("10.0.0.1", method, uri, body, token).await
    }

    pub async fn register(&self, email: &str, password: &str, role: i16) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/user/register",
            Some(serde_json::json!({ "email": email, "password": password, "role": role })),
            None,
        )
        .await
    }

    pub async fn verify(&self, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, &format!("/user/verify?token={}", token), None, None)
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/user/login",
            Some(serde_json::json!({ "email": email, "password": password })),
            None,
        )
        .await
    }

    pub async fn login_with_code(&self, email: &str, code: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &format!("/user/login/2fa/{}", code),
            Some(serde_json::json!({ "email": email })),
            None,
        )
        .await
    }

    /// Registers through the API and follows the mailed verification link.
    pub async fn verified_user(&self, email: &str) -> Value {
        let (status, body) = self.register(email, PASSWORD, 2).await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        let token = self
            .email
            .last_verification_token(email)
            .expect("verification email not sent");
        let (status, body) = self.verify(&token).await;
        assert_eq!(status, StatusCode::OK, "verify failed: {}", body);
        body
    }

    /// Verified account plus a session token.
    pub async fn session_for(&self, email: &str) -> String {
        self.verified_user(email).await;
        let (status, body) = self.login(email, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        access_token(&body)
    }

    /// Inserts an enabled account directly, bypassing registration rules.
    pub async fn seed_user(&self, email: &str, role: Role) -> User {
        let hash = hash_password(&Password::new(PASSWORD.to_string())).unwrap();
        let mut user = User::new(
            email.to_string(),
            hash.into_string(),
            role,
            format!("seed-{}", email),
        );
        user.enabled = true;
        self.store.insert_user(&user).await.unwrap();
        user
    }

    pub async fn admin_session(&self) -> String {
        let admin = self.seed_user("admin@theatre.test", Role::Admin).await;
        self.state.jwt.generate_token(&admin).unwrap().access_token
    }
}

pub fn access_token(body: &Value) -> String {
    body["data"]["access_token"]
        .as_str()
        .expect("missing access token")
        .to_string()
}

pub fn error_code(body: &Value) -> &str {
    body["errorCode"].as_str().unwrap_or("")
}
