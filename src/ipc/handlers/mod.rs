pub mod absences;
pub mod analytics;
pub mod core;
pub mod schedules;
pub mod setup;
pub mod teachers;
