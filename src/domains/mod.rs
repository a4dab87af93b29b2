pub mod logger;
pub mod navigation;

pub use logger::*;
pub use navigation::*;
