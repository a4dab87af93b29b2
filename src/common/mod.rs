pub mod error;
pub mod event;
pub mod time;

pub use error::*;
pub use event::*;
pub use time::*;
