//! Outbound notification sink.
//!
//! Two message types leave the system: a customer receipt and an internal
//! sale alert. Both are fire-and-forget: the reconciler logs failures and
//! never lets them affect an already-recorded order.

use crate::config::AppConfig;
use crate::services::orders::OrderResponse;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur when sending a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

/// Abstract outbound channel for order notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Internal sale alert to the shop operator.
    async fn send_sale_alert(&self, order: &OrderResponse) -> Result<(), NotificationError>;

    /// Receipt to the customer, when an address is known.
    async fn send_receipt(&self, order: &OrderResponse, to: &str) -> Result<(), NotificationError>;
}

/// SMTP-backed sink.
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    admin_email: Option<String>,
}

impl SmtpNotifier {
    /// Builds the sink when an SMTP relay is configured; `None` otherwise.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, SmtpError> {
        let Some(host) = config.smtp_host.as_deref() else {
            return Ok(None);
        };

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Some(Self {
            mailer,
            from_address: config.smtp_from.clone(),
            admin_email: config.admin_email.clone(),
        }))
    }

    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), NotificationError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotificationError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| NotificationError::InvalidAddress(to.to_string()))?)
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

        self.mailer.send(email).await?;
        info!(to = %to, subject = %subject, "Notification email sent");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for SmtpNotifier {
    async fn send_sale_alert(&self, order: &OrderResponse) -> Result<(), NotificationError> {
        let Some(admin) = self.admin_email.as_deref() else {
            debug!("No admin notification address configured; skipping sale alert");
            return Ok(());
        };

        let subject = format!("New sale: order {}", order.id);
        self.send_email(
            admin,
            &subject,
            sale_alert_text(order),
            sale_alert_html(order),
        )
        .await
    }

    async fn send_receipt(&self, order: &OrderResponse, to: &str) -> Result<(), NotificationError> {
        let subject = format!("Your order confirmation ({})", order.id);
        self.send_email(to, &subject, receipt_text(order), receipt_html(order))
            .await
    }
}

/// Sink used when no SMTP relay is configured; logs and drops.
pub struct DiscardNotifier;

#[async_trait]
impl NotificationSink for DiscardNotifier {
    async fn send_sale_alert(&self, order: &OrderResponse) -> Result<(), NotificationError> {
        debug!(order_id = %order.id, "Email disabled; discarding sale alert");
        Ok(())
    }

    async fn send_receipt(
        &self,
        order: &OrderResponse,
        _to: &str,
    ) -> Result<(), NotificationError> {
        debug!(order_id = %order.id, "Email disabled; discarding receipt");
        Ok(())
    }
}

fn format_amount(minor_units: i64) -> String {
    format!("{}", Decimal::new(minor_units, 2))
}

fn itemized_lines(order: &OrderResponse) -> Vec<String> {
    order
        .items
        .iter()
        .map(|item| format!("{} x{} @ {}", item.name, item.quantity, item.unit_price))
        .collect()
}

fn sale_alert_text(order: &OrderResponse) -> String {
    let mut lines = vec![
        format!("Order {}", order.id),
        format!(
            "Customer: {} <{}>",
            order.customer_name.as_deref().unwrap_or("unknown"),
            order.customer_email.as_deref().unwrap_or("no email"),
        ),
        format!("Total: {}", format_amount(order.amount_total)),
        String::new(),
    ];
    lines.extend(itemized_lines(order));
    lines.join("\n")
}

fn sale_alert_html(order: &OrderResponse) -> String {
    let items: String = order
        .items
        .iter()
        .map(|item| {
            format!(
                "<li>{} &times; {} @ {}</li>",
                item.name, item.quantity, item.unit_price
            )
        })
        .collect();

    format!(
        "<h2>New sale</h2>\
         <p>Order <strong>{}</strong></p>\
         <p>Customer: {} &lt;{}&gt;</p>\
         <p>Total: <strong>{}</strong></p>\
         <ul>{}</ul>",
        order.id,
        order.customer_name.as_deref().unwrap_or("unknown"),
        order.customer_email.as_deref().unwrap_or("no email"),
        format_amount(order.amount_total),
        items,
    )
}

fn receipt_text(order: &OrderResponse) -> String {
    let mut lines = vec![
        "Thank you for your order!".to_string(),
        format!("Order reference: {}", order.id),
        format!("Total: {}", format_amount(order.amount_total)),
        String::new(),
    ];
    lines.extend(itemized_lines(order));
    lines.join("\n")
}

fn receipt_html(order: &OrderResponse) -> String {
    let items: String = order
        .items
        .iter()
        .map(|item| {
            format!(
                "<li>{} &times; {} @ {}</li>",
                item.name, item.quantity, item.unit_price
            )
        })
        .collect();

    format!(
        "<h2>Thank you for your order!</h2>\
         <p>Order reference: <strong>{}</strong></p>\
         <p>Total: <strong>{}</strong></p>\
         <ul>{}</ul>",
        order.id, format_amount(order.amount_total), items,
    )
}
