pub mod accessor;

pub use accessor::*;
