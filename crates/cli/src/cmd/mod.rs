mod args;
mod bootstrap;
mod build;
mod fetch;
mod status;

pub use args::{cmd_args, cmd_defaults};
pub use bootstrap::cmd_bootstrap;
pub use build::{BuildOptions, cmd_build};
pub use fetch::cmd_fetch;
pub use status::cmd_status;
