pub mod generation;
pub mod location;
pub mod period;
pub mod weather;

pub use generation::*;
pub use location::*;
pub use period::*;
pub use weather::*;
