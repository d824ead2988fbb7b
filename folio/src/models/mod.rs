mod analysis;
mod document;
mod result;

pub use analysis::*;
pub use document::*;
pub use result::*;
