//! CLI command handlers. Each command is in its own file.

mod checksum;
mod completions;
mod download;
mod ensure_dir;
mod extract;
mod monitor;

pub use checksum::run_checksum;
pub use completions::{run_completions, run_man};
pub use download::run_download;
pub use ensure_dir::run_ensure_dir;
pub use extract::run_extract;
pub use monitor::run_monitor;
