pub mod price_reading;
pub mod alert_subscription;
