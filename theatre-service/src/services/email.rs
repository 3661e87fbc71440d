use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use service_core::axum::async_trait;
use service_core::error::AppError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SmtpConfig;

/// Outbound mail used by the registration and two-factor flows.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        base_url: &str,
    ) -> Result<(), AppError>;

    async fn send_two_factor_code(
        &self,
        to_email: &str,
        code: &str,
        valid_for_minutes: i64,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let mut builder = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)));

        if !config.user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ));
        }

        tracing::info!(host = %config.host, port = config.port, "Email service initialized");

        Ok(Self {
            mailer: builder.build(),
            from_email: config.from.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        // SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        let verification_link = format!("{}/user/verify?token={}", base_url, verification_token);

        let html_body = format!(
            r#"<html>
  <body style="font-family: Georgia, serif;">
    <h2>Welcome to the company!</h2>
    <p>Confirm your email address to activate your account:</p>
    <p><a href="{link}">Verify my email</a></p>
    <p style="color: #666; font-size: 12px;">If you did not register, ignore this message.</p>
  </body>
</html>"#,
            link = verification_link
        );

        let plain_body = format!(
            "Welcome to the company!\n\nConfirm your email address to activate your account:\n\n{}\n\nIf you did not register, ignore this message.",
            verification_link
        );

        self.send_email(to_email, "Verify your email address", plain_body, html_body)
            .await
    }

    async fn send_two_factor_code(
        &self,
        to_email: &str,
        code: &str,
        valid_for_minutes: i64,
    ) -> Result<(), AppError> {
        let html_body = format!(
            r#"<html>
  <body style="font-family: Georgia, serif;">
    <h2>Your sign-in code</h2>
    <p style="font-size: 24px; letter-spacing: 4px;"><strong>{code}</strong></p>
    <p style="color: #666; font-size: 12px;">The code expires in {minutes} minutes and can be used once.</p>
  </body>
</html>"#,
            code = code,
            minutes = valid_for_minutes
        );

        let plain_body = format!(
            "Your sign-in code is {}\n\nThe code expires in {} minutes and can be used once.",
            code, valid_for_minutes
        );

        self.send_email(to_email, "Your sign-in code", plain_body, html_body)
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEmail {
    Verification { to: String, token: String },
    TwoFactorCode { to: String, code: String },
}

/// Records outgoing mail instead of sending it.
#[derive(Clone, Default)]
pub struct MockEmailService {
    outbox: Arc<Mutex<Vec<SentEmail>>>,
    fail: bool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails.
    pub fn failing() -> Self {
        Self {
            outbox: Arc::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }

    pub fn last_verification_token(&self, to_email: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|email| match email {
            SentEmail::Verification { to, token } if to == to_email => Some(token),
            _ => None,
        })
    }

    pub fn last_two_factor_code(&self, to_email: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|email| match email {
            SentEmail::TwoFactorCode { to, code } if to == to_email => Some(code),
            _ => None,
        })
    }

    fn record(&self, email: SentEmail) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::EmailError("mock mailer is offline".to_string()));
        }
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push(email);
        }
        Ok(())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        _base_url: &str,
    ) -> Result<(), AppError> {
        self.record(SentEmail::Verification {
            to: to_email.to_string(),
            token: verification_token.to_string(),
        })
    }

    async fn send_two_factor_code(
        &self,
        to_email: &str,
        code: &str,
        _valid_for_minutes: i64,
    ) -> Result<(), AppError> {
        self.record(SentEmail::TwoFactorCode {
            to: to_email.to_string(),
            code: code.to_string(),
        })
    }
}
