use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("No subscribers on channel {0}")]
    NoSubscribers(String),

    #[error("Delivery failed on channel {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
