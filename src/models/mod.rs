pub mod endpoint;
pub mod fetch;
pub mod listing;

pub use endpoint::*;
pub use fetch::*;
pub use listing::*;
