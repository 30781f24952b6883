pub mod lead;
pub mod payload;
pub mod source;

pub use lead::*;
pub use payload::*;
pub use source::*;
