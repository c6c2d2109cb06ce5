mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use v8forge_lib::platform::{Arch, Os};

use crate::output::OutputFormat;

/// v8forge - pinned V8 source acquisition and monolithic static library builds
#[derive(Parser)]
#[command(name = "v8forge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Show debug logs and toolchain output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

/// Flags selecting a build target.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
  /// Target CPU architecture (x64, arm64)
  #[arg(long)]
  pub arch: Arch,

  /// Target OS (linux, mac, win). Defaults to the host
  #[arg(long)]
  pub os: Option<Os>,

  /// Debug variant (falls back to release on Windows)
  #[arg(long)]
  pub debug: bool,

  /// GN symbol_level. Defaults from the variant
  #[arg(long)]
  pub symbol_level: Option<u8>,

  /// Clang toolchain root passed to GN as clang_base_path
  #[arg(long)]
  pub clang_base_path: Option<PathBuf>,

  /// Compiler cache wrapper passed to GN as cc_wrapper (e.g. sccache)
  #[arg(long)]
  pub cc_wrapper: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
  /// Fetch a pinned V8 revision and its dependencies
  Fetch {
    /// Tag, branch or commit
    #[arg(env = "V8_VERSION")]
    version: String,

    /// Destination directory
    #[arg(default_value = "v8")]
    dest: PathBuf,

    /// Primary repository URL
    #[arg(long, env = "V8FORGE_URL")]
    url: Option<String>,

    /// Do not apply source patches
    #[arg(long)]
    no_patches: bool,

    /// Force a DEPS condition true (repeatable)
    #[arg(long = "condition", value_name = "NAME")]
    conditions: Vec<String>,
  },

  /// Build v8_monolith for a target and install it
  Build {
    /// Base args file. Defaults to the built-in monolith config
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    target: TargetArgs,

    /// Acquired source tree
    #[arg(long, default_value = "v8")]
    source: PathBuf,

    /// Where to install headers, archives and build.json
    #[arg(long)]
    install_dir: PathBuf,

    /// Download Chromium's clang and use it unless --clang-base-path is given
    #[arg(long)]
    download_clang: bool,

    /// depot_tools checkout providing gn and ninja. Defaults to the `bootstrap` checkout if present
    #[arg(long, env = "V8FORGE_DEPOT_TOOLS")]
    depot_tools: Option<PathBuf>,

    /// Parallel compile jobs
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Limit for each toolchain step (e.g. 2h, 90m)
    #[arg(long)]
    timeout: Option<humantime::Duration>,
  },

  /// Print the effective args for a target without building
  Args {
    /// Base args file. Defaults to the built-in monolith config
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    target: TargetArgs,
  },

  /// Print the built-in monolith base args
  Defaults,

  /// Show what a source tree or install directory contains
  Status {
    /// Source tree or install directory
    #[arg(default_value = "v8")]
    path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Clone depot_tools
  Bootstrap {
    /// Checkout directory. Defaults to the cache directory
    dir: Option<PathBuf>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Fetch {
      version,
      dest,
      url,
      no_patches,
      conditions,
    } => cmd::cmd_fetch(&version, &dest, url, no_patches, conditions),
    Commands::Build {
      config,
      target,
      source,
      install_dir,
      download_clang,
      depot_tools,
      jobs,
      timeout,
    } => cmd::cmd_build(cmd::BuildOptions {
      config,
      target,
      source,
      install_dir,
      download_clang,
      depot_tools,
      jobs,
      timeout: timeout.map(Into::into),
    }),
    Commands::Args { config, target } => cmd::cmd_args(config.as_deref(), &target),
    Commands::Defaults => {
      cmd::cmd_defaults();
      Ok(())
    }
    Commands::Status { path, output } => cmd::cmd_status(&path, output),
    Commands::Bootstrap { dir } => cmd::cmd_bootstrap(dir),
  }
}
