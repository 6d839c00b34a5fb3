pub mod artifact;
pub mod market;
pub mod signal;

pub use artifact::*;
pub use market::*;
pub use signal::*;
