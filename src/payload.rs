//! File payloads
//!
//! A component whose `source` points at a directory (or a single file) can be
//! installed by copying it into the install directory. [`attach_hooks`] wires
//! that up: the installer copies the tree, the uninstaller removes exactly the
//! files the tree contains and then any directories left empty.

use crate::config::Config;
use crate::context::Context;
use anyhow::{Context as _, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// One file or directory of a payload, relative to the payload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEntry {
    pub relative: PathBuf,
    pub is_dir: bool,
    pub size: u64,
}

/// Walk `source`. A plain file yields a single entry named after it.
pub fn collect_entries(source: &Path) -> Result<Vec<PayloadEntry>> {
    let metadata = fs::metadata(source)
        .with_context(|| format!("Payload {} is not readable", source.display()))?;
    if metadata.is_file() {
        let name = source
            .file_name()
            .with_context(|| format!("Payload {} has no file name", source.display()))?;
        return Ok(vec![PayloadEntry {
            relative: PathBuf::from(name),
            is_dir: false,
            size: metadata.len(),
        }]);
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(source).follow_links(false).min_depth(1) {
        let entry = entry.context("Failed to read payload entry")?;
        let metadata = entry.metadata().context("Failed to read payload metadata")?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .unwrap_or(entry.path())
            .to_path_buf();
        entries.push(PayloadEntry {
            relative,
            is_dir: metadata.is_dir(),
            size: if metadata.is_file() { metadata.len() } else { 0 },
        });
    }
    Ok(entries)
}

/// Total bytes of the files under `source`.
pub fn payload_size(source: &Path) -> Result<u64> {
    Ok(collect_entries(source)?.iter().map(|e| e.size).sum())
}

fn root_of(source: &Path) -> &Path {
    if source.is_file() {
        source.parent().unwrap_or(source)
    } else {
        source
    }
}

/// Copy the payload into `dest`. Returns the files written.
pub fn copy_into(source: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let entries = collect_entries(source)?;
    let root = root_of(source);
    fs::create_dir_all(dest).with_context(|| format!("Failed to create {}", dest.display()))?;

    let mut written = Vec::new();
    for entry in &entries {
        let target = dest.join(&entry.relative);
        if entry.is_dir {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(root.join(&entry.relative), &target)
            .with_context(|| format!("Failed to copy to {}", target.display()))?;
        written.push(target);
    }
    log::debug!("Copied {} file(s) into {}", written.len(), dest.display());
    Ok(written)
}

/// Remove what [`copy_into`] wrote. Files not in the payload are left alone,
/// and so are directories that still hold them. Returns the files removed.
pub fn remove_from(source: &Path, dest: &Path) -> Result<usize> {
    let entries = collect_entries(source)?;
    let mut removed = 0;

    for entry in entries.iter().filter(|e| !e.is_dir) {
        let target = dest.join(&entry.relative);
        match fs::remove_file(&target) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", target.display()));
            }
        }
    }

    // Deepest first so parents are empty by the time they are reached
    let mut dirs: Vec<PathBuf> = entries
        .iter()
        .filter(|e| e.is_dir)
        .map(|e| dest.join(&e.relative))
        .collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        let _ = fs::remove_dir(&dir);
    }

    Ok(removed)
}

/// Give every component with a `source` copy hooks, resolving relative
/// sources against `base`. Components that already have an installer keep
/// it. A component with no declared size gets the payload size.
pub fn attach_hooks(config: &mut Config, base: &Path) {
    for component in &mut config.components {
        let Some(source) = component.source.clone() else {
            continue;
        };
        if component.hooks.installer.is_some() {
            log::debug!("Component '{}' has its own installer", component.id);
            continue;
        }
        let source = if source.is_absolute() {
            source
        } else {
            base.join(source)
        };

        if component.size == 0 {
            match payload_size(&source) {
                Ok(size) => component.size = size,
                Err(e) => log::warn!("Size of '{}' unknown: {:#}", component.id, e),
            }
        }

        if component.hooks.validator.is_none() {
            let check = source.clone();
            component.hooks.validator = Some(Arc::new(move |_ctx: &Context| -> Result<()> {
                if check.exists() {
                    Ok(())
                } else {
                    anyhow::bail!("payload {} is missing", check.display())
                }
            }));
        }
        if component.hooks.uninstaller.is_none() {
            let uninstall = source.clone();
            component.hooks.uninstaller = Some(Arc::new(move |ctx: &Context| -> Result<()> {
                let removed = remove_from(&uninstall, ctx.install_dir())?;
                ctx.log().info(format!("Removed {} file(s)", removed));
                Ok(())
            }));
        }
        component.hooks.installer = Some(Arc::new(move |ctx: &Context| -> Result<()> {
            let written = copy_into(&source, ctx.install_dir())?;
            ctx.log().info(format!("Copied {} file(s)", written.len()));
            Ok(())
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Component;

    /// `<tmp>/payload/{bin/acme, README}`
    fn payload() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("payload");
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/acme"), "#!/bin/sh\n").unwrap();
        fs::write(root.join("README"), "hello").unwrap();
        (dir, root)
    }

    #[test]
    fn test_copy_and_remove_round_trip() {
        let (_tmp, src) = payload();
        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("acme");

        let written = copy_into(&src, &target).unwrap();
        assert_eq!(written.len(), 2);
        assert!(target.join("bin/acme").is_file());

        fs::write(target.join("user.conf"), "keep").unwrap();
        assert_eq!(remove_from(&src, &target).unwrap(), 2);
        assert!(!target.join("bin").exists());
        assert!(target.join("user.conf").is_file());
    }

    #[test]
    fn test_single_file_payload() {
        let (_tmp, src) = payload();
        let dest = tempfile::tempdir().unwrap();
        let file = src.join("README");

        copy_into(&file, dest.path()).unwrap();
        assert_eq!(fs::read_to_string(dest.path().join("README")).unwrap(), "hello");
        assert_eq!(payload_size(&file).unwrap(), 5);
    }

    #[test]
    fn test_attach_hooks_resolves_relative_source() {
        let (tmp, _src) = payload();
        let dest = tempfile::tempdir().unwrap();
        let mut config = Config::new("Acme", "1.0", dest.path().join("acme"))
            .with_component(Component::new("core", "Core").with_source("payload"))
            .with_component(Component::new("docs", "Docs"));

        attach_hooks(&mut config, tmp.path());

        let core = config.component("core").unwrap();
        assert_eq!(core.size, 15);
        assert!(core.hooks.installer.is_some());
        assert!(config.component("docs").unwrap().hooks.installer.is_none());

        let ctx = Context::new(&config);
        let installer = core.hooks.installer.clone().unwrap();
        installer(&ctx).unwrap();
        assert!(dest.path().join("acme/bin/acme").is_file());
    }
}
