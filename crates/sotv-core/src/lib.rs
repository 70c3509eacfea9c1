pub mod canon;
pub mod error;
pub mod ids;
pub mod model;
pub mod score;
pub mod types;

pub use canon::*;
pub use error::*;
pub use ids::*;
pub use model::*;
pub use score::*;
pub use types::*;
