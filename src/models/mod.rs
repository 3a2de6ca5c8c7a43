pub mod document;
pub mod enums;

pub use document::*;
