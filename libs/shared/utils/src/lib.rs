pub mod clock;
pub mod time_window;
pub mod test_utils;

pub use clock::{Clock, FixedClock, SystemClock};
pub use time_window::{ClinicCalendar, TimeWindowError, YearMonth};
