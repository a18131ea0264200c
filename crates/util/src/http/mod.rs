pub mod parser;
pub mod path;

pub use parser::*;
pub use path::*;
