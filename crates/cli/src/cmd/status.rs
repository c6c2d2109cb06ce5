//! Status command implementation.
//!
//! Reports an install directory's `build.json` when present, otherwise the
//! source marker of an acquired tree.

use std::path::Path;

use anyhow::{Context, Result};

use v8forge_lib::build::InstallManifest;
use v8forge_lib::consts::INSTALL_MANIFEST;
use v8forge_lib::source::SourceMarker;

use crate::output::{
  OutputFormat, format_bytes, print_info, print_json, print_stat, print_success, symbols, truncate_hash,
};

pub fn cmd_status(path: &Path, output: OutputFormat) -> Result<()> {
  if path.join(INSTALL_MANIFEST).is_file() {
    let manifest = InstallManifest::load(path)
      .with_context(|| format!("Failed to read {}", path.join(INSTALL_MANIFEST).display()))?;
    return print_install(&manifest, output);
  }

  match SourceMarker::load(path)? {
    Some(marker) => print_source(&marker, output),
    None => {
      print_info(&format!(
        "No source tree or install at {}. Run 'v8forge fetch' first.",
        path.display()
      ));
      Ok(())
    }
  }
}

fn print_source(marker: &SourceMarker, output: OutputFormat) -> Result<()> {
  if output.is_json() {
    return print_json(marker);
  }

  print_success(&format!("V8 {}", marker.version));
  print_stat("URL", &marker.url);
  print_stat("Commit", truncate_hash(&marker.commit));
  print_stat("Dependencies", &marker.dependencies.len().to_string());
  for dep in &marker.dependencies {
    println!("  {} {} @ {}", symbols::INFO, dep.path, truncate_hash(&dep.commit));
  }
  Ok(())
}

fn print_install(manifest: &InstallManifest, output: OutputFormat) -> Result<()> {
  if output.is_json() {
    return print_json(manifest);
  }

  print_success(&format!("V8 {} for {}", manifest.version, manifest.target));
  print_stat("Commit", truncate_hash(&manifest.commit));
  print_stat("Args digest", truncate_hash(&manifest.args_digest));
  print_stat(
    "Library",
    &format!("{} ({})", manifest.primary.name, format_bytes(manifest.primary.size)),
  );
  for aux in &manifest.auxiliary {
    println!("  {} {} ({})", symbols::INFO, aux.name, format_bytes(aux.size));
  }
  print_stat("Headers", &manifest.headers.files.to_string());
  Ok(())
}
