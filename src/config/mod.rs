pub mod loader;
pub mod types;

pub use loader::{get_config_path, load_config};
pub use types::{BwrapperConfig, RunSettings, SandboxSettings};
