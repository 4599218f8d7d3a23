pub mod events;
pub mod outgoing;
pub mod stats;
pub mod tracks;
pub mod voice;

pub use events::*;
pub use outgoing::*;
pub use stats::*;
pub use tracks::*;
pub use voice::*;
