pub mod file;
pub mod keys;
pub mod memory;
pub mod traits;

pub use file::*;
pub use memory::*;
pub use traits::*;
