pub mod icons;
pub mod progress;

pub use progress::{ProgressUI, format_duration, status_line};
