pub mod block;
pub mod connection;
pub mod error;
pub mod settings;
pub mod threat;

pub use block::*;
pub use connection::*;
pub use error::*;
pub use settings::*;
pub use threat::*;
