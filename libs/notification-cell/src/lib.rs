pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::channel::{BroadcastDelivery, DeliveryChannel};
pub use services::dispatcher::NotificationDispatcher;
