pub mod progress;

pub use progress::{Console, SweepStatus};
