pub mod acquisition;
pub mod actors;
pub mod arrival;
pub mod coordinator;
pub mod costmap;
pub mod emergency;
pub mod events;
pub mod messages;
pub mod orientation;
pub mod ports;
pub mod stuck;
pub mod types;
pub mod waypoint_queue;

pub use actors::*;
pub use coordinator::*;
pub use events::*;
pub use messages::*;
pub use ports::*;
pub use types::*;
