//! Email service for verification codes and order notifications.
//!
//! Bodies are rendered with Askama (plain text + HTML). Delivery goes over
//! SMTP via lettre when `SMTP_HOST` is configured, otherwise to an in-memory
//! outbox that development servers and tests can read back. The outbox keeps
//! the newest [`OUTBOX_CAPACITY`] messages and logs every text body at `info`,
//! so codes stay reachable on a server without SMTP.
//!
//! SMTP sends are fire-and-forget: rendering and message building happen on
//! the caller's task so their errors are returned, the network round trip is
//! spawned and only logged.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crave_core::{Email, OrderId, Price, VerificationPurpose};

use crate::config::EmailConfig;
use crate::models::order::{OrderDetails, OrderItem};

#[derive(Template)]
#[template(path = "email/verification_code.html")]
struct VerificationCodeEmailHtml<'a> {
    subject: &'a str,
    name: &'a str,
    action: &'a str,
    code: &'a str,
    ttl_minutes: i64,
}

#[derive(Template)]
#[template(path = "email/verification_code.txt")]
struct VerificationCodeEmailText<'a> {
    name: &'a str,
    action: &'a str,
    code: &'a str,
    ttl_minutes: i64,
}

#[derive(Template)]
#[template(path = "email/welcome.html")]
struct WelcomeEmailHtml<'a> {
    name: &'a str,
    base_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeEmailText<'a> {
    name: &'a str,
    base_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    name: &'a str,
    order_id: OrderId,
    delivery_address: &'a str,
    items: &'a [OrderItem],
    total: Price,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    name: &'a str,
    order_id: OrderId,
    delivery_address: &'a str,
    items: &'a [OrderItem],
    total: Price,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Messages the outbox holds before dropping the oldest.
pub const OUTBOX_CAPACITY: usize = 100;

/// A message captured by the outbox transport.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[derive(Clone)]
enum Transport {
    Smtp {
        mailer: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    Outbox(Arc<Mutex<VecDeque<OutboxMessage>>>),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    transport: Transport,
    base_url: String,
}

impl EmailService {
    /// Create an SMTP-backed email service (STARTTLS relay).
    ///
    /// # Errors
    ///
    /// Returns `MailError::Smtp` if the relay cannot be configured, or
    /// `MailError::InvalidAddress` for an unparsable sender.
    pub fn smtp(config: &EmailConfig, base_url: &str) -> Result<Self, MailError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport: Transport::Smtp {
                mailer,
                from: parse_mailbox(&config.from_address)?,
            },
            base_url: base_url.to_owned(),
        })
    }

    /// Create a service that keeps the latest messages in memory.
    #[must_use]
    pub fn outbox(base_url: &str) -> Self {
        Self {
            transport: Transport::Outbox(Arc::new(Mutex::new(VecDeque::with_capacity(
                OUTBOX_CAPACITY,
            )))),
            base_url: base_url.to_owned(),
        }
    }

    /// SMTP when configured, the outbox otherwise.
    ///
    /// # Errors
    ///
    /// Returns `MailError` if the SMTP configuration is unusable.
    pub fn from_config(config: Option<&EmailConfig>, base_url: &str) -> Result<Self, MailError> {
        match config {
            Some(config) => Self::smtp(config, base_url),
            None => {
                tracing::warn!("SMTP not configured, emails go to the in-memory outbox");
                Ok(Self::outbox(base_url))
            }
        }
    }

    /// Messages held by the outbox, oldest first (empty for SMTP).
    #[must_use]
    pub fn outbox_messages(&self) -> Vec<OutboxMessage> {
        match &self.transport {
            Transport::Outbox(outbox) => outbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned()
                .collect(),
            Transport::Smtp { .. } => Vec::new(),
        }
    }

    /// Send a verification code for `purpose`.
    ///
    /// # Errors
    ///
    /// Returns error if the template fails to render or the message cannot be built.
    pub fn send_verification_code(
        &self,
        to: &Email,
        name: &str,
        purpose: VerificationPurpose,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<(), MailError> {
        let subject = purpose.subject();
        let action = purpose.action();
        let html = VerificationCodeEmailHtml {
            subject,
            name,
            action,
            code,
            ttl_minutes,
        }
        .render()?;
        let text = VerificationCodeEmailText {
            name,
            action,
            code,
            ttl_minutes,
        }
        .render()?;

        self.dispatch(to, subject, text, html)
    }

    /// Send a welcome email after the address is verified.
    ///
    /// # Errors
    ///
    /// Returns error if the template fails to render or the message cannot be built.
    pub fn send_welcome(&self, to: &Email, name: &str) -> Result<(), MailError> {
        let base_url = self.base_url.as_str();
        let html = WelcomeEmailHtml { name, base_url }.render()?;
        let text = WelcomeEmailText { name, base_url }.render()?;

        self.dispatch(to, "Welcome to Crave", text, html)
    }

    /// Send an order confirmation.
    ///
    /// # Errors
    ///
    /// Returns error if the template fails to render or the message cannot be built.
    pub fn send_order_confirmation(
        &self,
        to: &Email,
        name: &str,
        details: &OrderDetails,
    ) -> Result<(), MailError> {
        let order = &details.order;
        let html = OrderConfirmationHtml {
            name,
            order_id: order.id,
            delivery_address: &order.delivery_address,
            items: &details.items,
            total: order.total,
        }
        .render()?;
        let text = OrderConfirmationText {
            name,
            order_id: order.id,
            delivery_address: &order.delivery_address,
            items: &details.items,
            total: order.total,
        }
        .render()?;

        let subject = format!("Your Crave order #{} is confirmed", order.id);
        self.dispatch(to, &subject, text, html)
    }

    /// Build a multipart message and hand it to the transport.
    fn dispatch(
        &self,
        to: &Email,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), MailError> {
        match &self.transport {
            Transport::Outbox(outbox) => {
                tracing::info!(
                    to = %to,
                    subject = %subject,
                    body = %text_body,
                    "Email captured in outbox"
                );
                let mut outbox = outbox.lock().unwrap_or_else(PoisonError::into_inner);
                if outbox.len() == OUTBOX_CAPACITY {
                    outbox.pop_front();
                }
                outbox.push_back(OutboxMessage {
                    to: to.as_str().to_owned(),
                    subject: subject.to_owned(),
                    text_body,
                    html_body,
                });
                Ok(())
            }
            Transport::Smtp { mailer, from } => {
                let message = Message::builder()
                    .from(from.clone())
                    .to(parse_mailbox(to.as_str())?)
                    .subject(subject)
                    .multipart(
                        MultiPart::alternative()
                            .singlepart(
                                SinglePart::builder()
                                    .header(ContentType::TEXT_PLAIN)
                                    .body(text_body),
                            )
                            .singlepart(
                                SinglePart::builder()
                                    .header(ContentType::TEXT_HTML)
                                    .body(html_body),
                            ),
                    )?;

                let mailer = mailer.clone();
                let masked = to.masked();
                let subject = subject.to_owned();
                tokio::spawn(async move {
                    match mailer.send(message).await {
                        Ok(_) => {
                            tracing::info!(to = %masked, subject = %subject, "Email sent successfully");
                        }
                        Err(e) => {
                            tracing::error!(to = %masked, subject = %subject, error = %e, "Email delivery failed");
                        }
                    }
                });
                Ok(())
            }
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse()
        .map_err(|_| MailError::InvalidAddress(address.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use crave_core::{FoodItemId, OrderItemId, OrderStatus, UserId};

    use super::*;
    use crate::models::order::Order;

    fn to() -> Email {
        Email::parse("hungry@example.com").unwrap()
    }

    #[test]
    fn test_verification_email_contains_code() {
        let service = EmailService::outbox("http://localhost:3000");
        service
            .send_verification_code(
                &to(),
                "Sam",
                VerificationPurpose::PasswordReset,
                "482910",
                10,
            )
            .unwrap();

        let sent = service.outbox_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "hungry@example.com");
        assert_eq!(sent[0].subject, VerificationPurpose::PasswordReset.subject());
        assert!(sent[0].text_body.contains("482910"));
        assert!(sent[0].text_body.contains("reset your password"));
        assert!(sent[0].html_body.contains("482910"));
        assert!(sent[0].html_body.contains("10 minutes"));
    }

    #[test]
    fn test_outbox_keeps_newest_messages() {
        let service = EmailService::outbox("http://localhost:3000");
        for n in 0..OUTBOX_CAPACITY + 5 {
            service
                .send_verification_code(
                    &to(),
                    "Sam",
                    VerificationPurpose::TwoFactor,
                    &format!("{:06}", 100_000 + n),
                    10,
                )
                .unwrap();
        }

        let sent = service.outbox_messages();
        assert_eq!(sent.len(), OUTBOX_CAPACITY);
        assert!(sent[0].text_body.contains("100005"));
        let newest = (100_000 + OUTBOX_CAPACITY + 4).to_string();
        assert!(sent.last().unwrap().text_body.contains(&newest));
    }

    #[test]
    fn test_html_is_escaped() {
        let service = EmailService::outbox("http://localhost:3000");
        service.send_welcome(&to(), "<script>").unwrap();

        let sent = service.outbox_messages();
        assert!(sent[0].text_body.contains("<script>"));
        assert!(!sent[0].html_body.contains("<script>"));
    }

    #[test]
    fn test_order_confirmation_lists_items() {
        let service = EmailService::outbox("http://localhost:3000");
        let now = Utc::now();
        let details = OrderDetails {
            order: Order {
                id: OrderId::new(42),
                user_id: UserId::new(1),
                status: OrderStatus::Pending,
                total: Price::from_cents(2150).unwrap(),
                delivery_address: "12 Elm St".to_owned(),
                notes: None,
                created_at: now,
                updated_at: now,
            },
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(42),
                food_item_id: Some(FoodItemId::new(3)),
                item_name: "Ramen".to_owned(),
                unit_price: Price::from_cents(1075).unwrap(),
                quantity: 2,
            }],
        };

        service
            .send_order_confirmation(&to(), "Sam", &details)
            .unwrap();

        let sent = service.outbox_messages();
        assert!(sent[0].subject.contains("#42"));
        assert!(sent[0].text_body.contains("2 x Ramen"));
        assert!(sent[0].text_body.contains("$21.50"));
    }
}
