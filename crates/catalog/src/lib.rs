pub mod arena;
pub mod definition;
pub mod tree;

pub use arena::*;
pub use definition::*;
pub use tree::*;
