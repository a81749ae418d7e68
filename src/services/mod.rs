pub mod alert_service;
pub mod price_query_service;

pub use alert_service::AlertService;
pub use price_query_service::PriceQueryService;
