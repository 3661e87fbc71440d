use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    auth_events_total: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Account lifecycle events counted in `auth_events_total`.
#[derive(Debug, Clone, Copy)]
pub enum AuthEvent {
    Registered,
    Verified,
    Login,
    LoginChallenge,
    LoginSecondFactor,
    OtpRejected,
    TwoFactorEnabled,
    TwoFactorDisabled,
}

impl AuthEvent {
    fn label(self) -> &'static str {
        match self {
            AuthEvent::Registered => "registered",
            AuthEvent::Verified => "verified",
            AuthEvent::Login => "login",
            AuthEvent::LoginChallenge => "login_2fa_challenge",
            AuthEvent::LoginSecondFactor => "login_2fa_success",
            AuthEvent::OtpRejected => "otp_rejected",
            AuthEvent::TwoFactorEnabled => "2fa_enabled",
            AuthEvent::TwoFactorDisabled => "2fa_disabled",
        }
    }
}

/// Registers collectors once. Later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let http_requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;

    let http_request_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;

    let auth_events_total = IntCounterVec::new(
        Opts::new("auth_events_total", "Account and session lifecycle events"),
        &["event"],
    )?;

    registry.register(Box::new(http_requests_total.clone()))?;
    registry.register(Box::new(http_request_duration_seconds.clone()))?;
    registry.register(Box::new(auth_events_total.clone()))?;

    // First initializer wins.
    let _ = METRICS.set(Metrics {
        registry,
        http_requests_total,
        http_request_duration_seconds,
        auth_events_total,
    });
    Ok(())
}

pub fn record_auth_event(event: AuthEvent) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .auth_events_total
            .with_label_values(&[event.label()])
            .inc();
    }
}

pub fn record_http_request(method: &str, path: &str, status: u16, seconds: f64) {
    let Some(metrics) = METRICS.get() else {
        return;
    };
    let status = status.to_string();
    metrics
        .http_requests_total
        .with_label_values(&[method, path, &status])
        .inc();
    metrics
        .http_request_duration_seconds
        .with_label_values(&[method, path, &status])
        .observe(seconds);
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match METRICS.get() {
        Some(m) => &m.registry,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to UTF-8: {}", e);
        format!("# Failed to convert metrics to UTF-8: {}\n", e)
    })
}
