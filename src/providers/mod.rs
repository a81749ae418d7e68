pub mod price_source;
pub mod moralis;

pub use price_source::PriceSource;
pub use moralis::MoralisClient;
