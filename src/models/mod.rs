pub mod enums;
pub mod report;
pub mod summary;

pub use enums::*;
pub use report::*;
pub use summary::*;
