use std::time::Duration;

use async_trait::async_trait;
use sea_orm::prelude::Decimal;
use serde::Serialize;

use crate::config::EmailConfig;
use crate::db::alert_subscription;
use crate::error::{ AppError, Result };

/// Best-effort message delivery. Callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<()>;
}

/// Sends mail through a transactional email HTTP API.
pub struct EmailNotifier {
    config: EmailConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client
            ::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build email client: {}", e)))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<()> {
        let payload = EmailPayload {
            from: &self.config.from,
            to: [destination],
            subject,
            text: body,
        };

        let response = self.client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send().await
            .map_err(|e| AppError::Notify(format!("Email API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Notify(format!("Email API returned status: {}", response.status())));
        }

        Ok(())
    }
}

/// Used when no email credentials are configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!(to = destination, subject, "Email delivery disabled, alert logged only:\n{}", body);
        Ok(())
    }
}

/// A rendered price alert for one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEmail {
    pub subject: String,
    pub body: String,
}

impl AlertEmail {
    pub fn render(
        subscription: &alert_subscription::Model,
        previous: Decimal,
        current: Decimal,
        change: Option<Decimal>
    ) -> Self {
        let arrow = if current >= previous { "up" } else { "down" };
        let change_text = match change {
            Some(c) => format!("{}%", (c * Decimal::ONE_HUNDRED).round_dp(2)),
            None => "n/a".to_string(),
        };

        let position = if current > subscription.threshold_usd {
            "above"
        } else if current < subscription.threshold_usd {
            "below"
        } else {
            "exactly at"
        };

        let subject = format!("{} price alert: ${}", subscription.token, current.normalize());
        let body = format!(
            "{token} moved {arrow}.\n\n\
            Previous price: ${previous}\n\
            Current price: ${current}\n\
            Change: {change}\n\n\
            The current price is {position} your ${threshold} threshold.",
            token = subscription.token,
            arrow = arrow,
            previous = previous.normalize(),
            current = current.normalize(),
            change = change_text,
            position = position,
            threshold = subscription.threshold_usd.normalize(),
        );

        Self { subject, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn subscription(threshold: &str) -> alert_subscription::Model {
        alert_subscription::Model {
            id: Uuid::new_v4(),
            token: "ETH".to_string(),
            threshold_usd: threshold.parse().unwrap(),
            email: "trader@example.com".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_alert_email() {
        let email = AlertEmail::render(
            &subscription("3050.00"),
            "3000.00".parse().unwrap(),
            "3100.00".parse().unwrap(),
            Some("0.0333333333".parse().unwrap())
        );

        assert_eq!(email.subject, "ETH price alert: $3100");
        assert!(email.body.contains("ETH moved up"));
        assert!(email.body.contains("Previous price: $3000"));
        assert!(email.body.contains("Change: 3.33%"));
        assert!(email.body.contains("above your $3050 threshold"));
    }

    #[test]
    fn test_render_alert_below_threshold() {
        let email = AlertEmail::render(
            &subscription("3050"),
            "3100".parse().unwrap(),
            "2900".parse().unwrap(),
            None
        );

        assert!(email.body.contains("ETH moved down"));
        assert!(email.body.contains("Change: n/a"));
        assert!(email.body.contains("below your $3050 threshold"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.send("a@example.com", "subject", "body").await.is_ok());
    }
}
