pub mod icons;
pub mod run_progress;

pub use run_progress::{RunUi, UiMode, format_duration};
