pub mod base;
pub mod logging;
pub mod manager;
pub mod node;

pub use base::*;
pub use logging::*;
pub use manager::*;
pub use node::*;
