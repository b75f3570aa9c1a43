use thiserror::Error;

use appointment_cell::StoreError;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Notification endpoint rejected the message with status {status}")]
    Rejected { status: u16 },
}

#[derive(Error, Debug)]
pub enum ReconcilerError {
    #[error("Store error during scan: {0}")]
    Store(#[from] StoreError),

    #[error("Patient {0} has no contact phone")]
    MissingContact(uuid::Uuid),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}
