pub mod alert;
pub mod diff;
pub mod engine;
pub mod event;
pub mod geo;
pub mod snapshot;
pub mod stats;

pub use alert::*;
pub use diff::*;
pub use engine::*;
pub use event::*;
pub use geo::*;
pub use snapshot::*;
pub use stats::*;
