//! Terminal user interface using Ratatui.

mod app;
mod backend;
mod compose;
mod log_capture;
mod messages;
mod sidebar;
mod ui;

pub use app::run;
pub use log_capture::LogBuffer;
