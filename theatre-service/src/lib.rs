pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Json, Router,
};
use service_core::middleware::{
    panic::panic_response,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AppConfig, SwaggerMode};
use crate::middleware::{authorize, track_metrics, RoleGuard, RolePolicy};
use crate::models::Role;
use crate::services::{EmailProvider, JwtService, UserService, UserStore, UserValidationService};
use service_core::error::AppError;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::metrics::metrics,
        handlers::user::registration::register,
        handlers::user::registration::verify_email,
        handlers::user::session::login,
        handlers::user::session::login_two_factor,
        handlers::user::two_factor::enable_two_factor,
        handlers::user::two_factor::disable_two_factor,
        handlers::user::balance::get_balance,
        handlers::user::social::link_social_account,
        handlers::user::social::unlink_social_account,
        handlers::user::profile::current_user,
    ),
    components(
        schemas(
            dtos::Envelope,
            dtos::user::RegisterRequest,
            dtos::user::LoginRequest,
            dtos::user::TwoFactorLoginRequest,
            dtos::user::SocialLinkRequest,
            dtos::user::UserSummary,
            dtos::user::BalanceResponse,
            services::TokenResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Registration", description = "Account creation and email verification"),
        (name = "Session", description = "Login and session tokens"),
        (name = "Two-Factor", description = "Emailed one-time codes"),
        (name = "Balance", description = "Account credit balances"),
        (name = "Social", description = "Linked social profiles"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn UserStore>,
    pub email: Arc<dyn EmailProvider>,
    pub jwt: JwtService,
    pub validation: UserValidationService,
    pub users: UserService,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wires the services over a store and a mail provider.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn UserStore>,
        email: Arc<dyn EmailProvider>,
    ) -> Result<Self, AppError> {
        let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;

        let validation = UserValidationService::new(
            store.clone(),
            jwt.clone(),
            config.two_factor.clone(),
            config.security.allow_admin_registration,
        );
        let users = UserService::new(
            store.clone(),
            email.clone(),
            jwt.clone(),
            config.two_factor.clone(),
            config.public_base_url.clone(),
        );

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let register_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.register_attempts,
            config.rate_limit.register_window_seconds,
        );

        Ok(Self {
            config,
            store,
            email,
            jwt,
            validation,
            users,
            login_rate_limiter,
            register_rate_limiter,
        })
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let login_routes = Router::new()
        .route("/user/login", post(handlers::user::login))
        .route("/user/login/2fa/:code", post(handlers::user::login_two_factor))
        .route_layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/user/register", post(handlers::user::register))
        .route_layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let account_routes = Router::new()
        .route("/user/enable2fa", post(handlers::user::enable_two_factor))
        .route("/user/disable2fa", post(handlers::user::disable_two_factor))
        .route("/user/@", get(handlers::user::current_user))
        .route(
            "/user/@/:platform",
            put(handlers::user::link_social_account).delete(handlers::user::unlink_social_account),
        )
        .route_layer(from_fn_with_state(
            RoleGuard::new(state.jwt.clone(), RolePolicy::any_role()),
            authorize,
        ));

    let admin_routes = Router::new()
        .route("/user/:id/balance", get(handlers::user::get_balance))
        .route_layer(from_fn_with_state(
            RoleGuard::new(state.jwt.clone(), RolePolicy::require(Role::Admin)),
            authorize,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/user/verify", get(handlers::user::verify_email));

    let openapi_path = "/.well-known/openapi.json";
    match state.config.swagger.enabled {
        SwaggerMode::Public => {
            app = app.merge(SwaggerUi::new("/docs").url(openapi_path, ApiDoc::openapi()));
        }
        SwaggerMode::Authenticated => {
            let docs: Router<AppState> = SwaggerUi::new("/docs")
                .url(openapi_path, ApiDoc::openapi())
                .into();
            app = app.merge(docs.route_layer(from_fn_with_state(
                RoleGuard::new(state.jwt.clone(), RolePolicy::any_role()),
                authorize,
            )));
        }
        SwaggerMode::Disabled => {
            app = app.route(openapi_path, get(|| async { Json(ApiDoc::openapi()) }));
        }
    }

    let origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    let app = app
        .merge(login_routes)
        .merge(register_route)
        .merge(account_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(from_fn(track_metrics))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "User store is unreachable", body = dtos::Envelope)
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "User store health check failed");
        AppError::from(e)
    })?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "service": state.config.service_name,
            "version": state.config.service_version,
            "environment": format!("{:?}", state.config.environment),
            "checks": {
                "store": "up"
            }
        })),
    ))
}
