pub mod credentials;
pub mod mileage;

pub use credentials::StravaCredentials;
pub use mileage::{NewWeeklyMileage, WeeklyMileageRecord};
