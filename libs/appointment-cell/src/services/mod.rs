pub mod availability;
pub mod booking;
pub mod leave;
pub mod lifecycle;
pub mod queue;
pub mod schedule;

pub use availability::AvailabilityService;
pub use booking::AppointmentBookingService;
pub use leave::LeaveService;
pub use lifecycle::AppointmentLifecycleService;
pub use queue::QueueService;
pub use schedule::ScheduleService;
