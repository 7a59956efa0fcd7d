mod config;
mod constants;
mod event;
mod metric;
mod stats;
mod threshold;

pub use config::*;
pub use constants::*;
pub use event::*;
pub use metric::*;
pub use stats::*;
pub use threshold::*;
