//! Queue error types.

use std::time::Duration;

use revoice_models::JobId;
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue full (capacity {0})")]
    QueueFull(usize),

    #[error("Queue closed")]
    Closed,

    #[error("Delivery of {what} timed out after {timeout:?}")]
    DeliveryTimeout {
        what: &'static str,
        timeout: Duration,
    },

    #[error("Requester stopped listening for {0}")]
    ReceiverGone(&'static str),

    #[error("Job {0} finished without a result")]
    Abandoned(JobId),
}

impl QueueError {
    /// True for errors raised while handing results back to the requester.
    pub fn is_delivery_error(&self) -> bool {
        matches!(self, Self::DeliveryTimeout { .. } | Self::ReceiverGone(_))
    }
}
