mod logger;
pub use logger::*;

#[cfg(feature = "progress")]
mod progress;
#[cfg(feature = "progress")]
pub use progress::*;
