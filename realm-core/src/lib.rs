pub mod error;
pub mod filter;
pub mod format;
pub mod guard;
pub mod metrics;
pub mod model;
pub mod ports;
pub mod projector;
pub mod search;
pub mod selection;
pub mod workflow;

pub use error::*;
pub use filter::*;
pub use guard::*;
pub use metrics::*;
pub use model::*;
pub use ports::*;
pub use projector::*;
pub use search::*;
pub use selection::*;
pub use workflow::*;
