pub mod events;
pub mod report;

pub use events::*;
pub use report::*;
