pub mod file_event_journal;
pub mod filesystem_map_service;
pub mod loggers;
pub mod publishers;
pub mod simulated_robot;

pub use file_event_journal::*;
pub use filesystem_map_service::*;
pub use loggers::*;
pub use publishers::*;
pub use simulated_robot::*;
