//! Line-oriented PATH files
//!
//! Shell start-up files, `/etc/profile.d` snippets and `/etc/paths.d` lists
//! all store one PATH entry per line. Entries are matched as whole lines so
//! removing `/opt/acme/bin` never touches `/opt/acme/bin2`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// How an entry is written to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    /// `export PATH="<dir>:$PATH"` for shell scripts
    Export,
    /// The bare directory, as `/etc/paths.d` expects
    Plain,
}

impl LineStyle {
    pub fn render(self, dir: &Path) -> String {
        match self {
            Self::Export => format!("export PATH=\"{}:$PATH\"", dir.display()),
            Self::Plain => dir.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathListFile {
    path: PathBuf,
    style: LineStyle,
}

impl PathListFile {
    pub fn new(path: impl Into<PathBuf>, style: LineStyle) -> Self {
        Self {
            path: path.into(),
            style,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn style(&self) -> LineStyle {
        self.style
    }

    /// File content, or empty if the file does not exist yet.
    fn read(&self) -> io::Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    pub fn contains(&self, dir: &Path) -> io::Result<bool> {
        let line = self.style.render(dir);
        Ok(self.read()?.lines().any(|l| l.trim_end() == line))
    }

    /// Append the entry unless present. Returns true if the file changed.
    pub fn add(&self, dir: &Path) -> io::Result<bool> {
        let line = self.style.render(dir);
        let mut content = self.read()?;
        if content.lines().any(|l| l.trim_end() == line) {
            log::debug!("{} already lists {}", self.path.display(), dir.display());
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&line);
        content.push('\n');
        fs::write(&self.path, content)?;
        log::info!("Added {} to {}", dir.display(), self.path.display());
        Ok(true)
    }

    /// Drop every line equal to the entry. Returns true if the file changed.
    pub fn remove(&self, dir: &Path) -> io::Result<bool> {
        let line = self.style.render(dir);
        let content = self.read()?;
        let kept: Vec<&str> = content.lines().filter(|l| l.trim_end() != line).collect();
        if kept.len() == content.lines().count() {
            return Ok(false);
        }

        let mut rewritten = kept.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        fs::write(&self.path, rewritten)?;
        log::info!("Removed {} from {}", dir.display(), self.path.display());
        Ok(true)
    }
}
