pub mod config;
pub mod error;
pub mod tokens;
pub mod db;
pub mod providers;
pub mod notifier;
pub mod scheduler;
pub mod services;
pub mod api;

pub use config::Config;
pub use error::{ AppError, Result };
pub use scheduler::{ PriceScheduler, SchedulerSettings, TickOutcome };
