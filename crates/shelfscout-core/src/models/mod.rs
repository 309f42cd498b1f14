pub mod book;
pub mod raw;
pub mod source;

pub use book::*;
pub use raw::*;
pub use source::*;
