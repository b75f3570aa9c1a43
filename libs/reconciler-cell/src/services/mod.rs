pub mod no_show;
pub mod notification;
pub mod reminder;
pub mod runner;

pub use no_show::NoShowDetector;
pub use notification::{transport_from_config, LogTransport, NotificationTransport, WebhookTransport};
pub use reminder::ReminderDispatcher;
pub use runner::{ReconcileTask, ReconcilerRunner};
