pub mod maintenance;
pub mod reminder_service;
pub mod scheduler;

pub use maintenance::MaintenanceStats;
pub use reminder_service::{ReminderService, ReminderStats};
pub use scheduler::ReminderScheduler;
