//! Windows integration through the stock command-line tools.
//!
//! The user PATH lives in `HKCU\Environment\Path` and is edited with
//! `reg.exe`; the "Apps & features" entry is a key under
//! `HKCU\...\CurrentVersion\Uninstall`. Elevation relaunches the installer
//! with `Start-Process -Verb RunAs`.

use super::{app_slug, InstallReceipt, Platform};
use crate::config::Config;
use crate::disk;
use crate::error::{ElevationError, PlatformError};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const ENVIRONMENT_KEY: &str = r"HKCU\Environment";
const UNINSTALL_ROOT: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Uninstall";
const UNINSTALL_MANIFEST: &str = ".setupflow-uninstall.json";

#[derive(Debug, Clone)]
pub struct WindowsPlatform {
    app_name: String,
    slug: String,
    elevated: bool,
}

impl WindowsPlatform {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            slug: app_slug(app_name),
            elevated: probe_admin(),
        }
    }

    fn uninstall_key(&self) -> String {
        format!(r"{}\{}", UNINSTALL_ROOT, self.slug)
    }

    fn read_user_path(&self) -> Result<Vec<String>, PlatformError> {
        let output = run("reg", &["query", ENVIRONMENT_KEY, "/v", "Path"]);
        let output = match output {
            Ok(out) => out,
            // A fresh profile has no user Path value at all
            Err(PlatformError::Command { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_reg_value(&stdout, "Path")
            .map(|v| split_path(&v))
            .unwrap_or_default())
    }

    fn write_user_path(&self, entries: &[String]) -> Result<(), PlatformError> {
        let joined = entries.join(";");
        run(
            "reg",
            &[
                "add", ENVIRONMENT_KEY, "/v", "Path", "/t", "REG_EXPAND_SZ", "/d", &joined, "/f",
            ],
        )?;
        Ok(())
    }

    fn set_value(&self, name: &str, kind: &str, data: &str) -> Result<(), PlatformError> {
        let key = self.uninstall_key();
        run(
            "reg",
            &["add", &key, "/v", name, "/t", kind, "/d", data, "/f"],
        )?;
        Ok(())
    }
}

/// Run a tool, turning a non-zero exit into a `PlatformError::Command`.
fn run(program: &str, args: &[&str]) -> Result<Output, PlatformError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(PlatformError::Command {
            command: format!("{} {}", program, args.first().copied().unwrap_or_default()),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// `net session` only succeeds for administrators.
fn probe_admin() -> bool {
    Command::new("net")
        .arg("session")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Extract a value's data from `reg query` output.
fn parse_reg_value(output: &str, name: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.trim().splitn(3, "    ");
        let key = parts.next()?.trim();
        let _kind = parts.next()?;
        let data = parts.next()?.trim();
        key.eq_ignore_ascii_case(name).then(|| data.to_string())
    })
}

fn split_path(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Windows paths compare case-insensitively, ignoring a trailing separator.
fn same_entry(entry: &str, dir: &Path) -> bool {
    let wanted = dir.display().to_string();
    entry
        .trim_end_matches('\\')
        .eq_ignore_ascii_case(wanted.trim_end_matches('\\'))
}

fn system_prefixes() -> Vec<PathBuf> {
    ["ProgramFiles", "ProgramFiles(x86)", "ProgramW6432", "SystemRoot"]
        .iter()
        .filter_map(|var| env::var_os(var).map(PathBuf::from))
        .collect()
}

fn powershell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Printed by the elevation script once the elevated child has started.
const LAUNCH_MARKER: &str = "setupflow-elevated";
/// ERROR_CANCELLED, raised when the UAC prompt is declined.
const ERROR_CANCELLED: i32 = 1223;

/// PowerShell that starts `exe` elevated and mirrors its exit code.
///
/// A declined prompt exits with `ERROR_CANCELLED` taken from the native error
/// code, never from message text. The marker line distinguishes a child that
/// happened to exit with the same number.
fn elevation_script(exe: &Path, args: &[String]) -> String {
    let mut start = format!(
        "Start-Process -FilePath {} -Verb RunAs -Wait -PassThru -ErrorAction Stop",
        powershell_quote(&exe.display().to_string())
    );
    if !args.is_empty() {
        let quoted: Vec<String> = args.iter().map(|a| powershell_quote(a)).collect();
        start.push_str(&format!(" -ArgumentList {}", quoted.join(",")));
    }
    format!(
        "try {{ $p = {start} }} catch {{ \
         $e = $_.Exception; \
         while ($e -and -not ($e -is [System.ComponentModel.Win32Exception])) {{ $e = $e.InnerException }}; \
         if ($e -and $e.NativeErrorCode -eq {ERROR_CANCELLED}) {{ exit {ERROR_CANCELLED} }}; \
         [Console]::Error.WriteLine($_.Exception.Message); exit 1 }}; \
         if ($p -eq $null) {{ [Console]::Error.WriteLine('Start-Process returned no process'); exit 1 }}; \
         Write-Output '{LAUNCH_MARKER}'; exit $p.ExitCode"
    )
}

/// Map the elevation script's result to the child's exit code.
fn elevation_outcome(code: Option<i32>, stdout: &str, stderr: &str) -> Result<i32, ElevationError> {
    let launched = stdout.lines().any(|l| l.trim() == LAUNCH_MARKER);
    match code {
        Some(code) if launched => Ok(code),
        Some(ERROR_CANCELLED) => Err(ElevationError::Denied),
        _ => {
            let detail = stderr.trim();
            Err(ElevationError::Failed(if detail.is_empty() {
                "elevated process could not be started".to_string()
            } else {
                detail.to_string()
            }))
        }
    }
}

impl Platform for WindowsPlatform {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn initialize(&mut self, config: &Config) -> Result<(), PlatformError> {
        log::info!(
            "Platform 'windows' ready for {} (administrator: {})",
            config.app_name,
            self.elevated
        );
        Ok(())
    }

    fn check_requirements(&self, config: &Config) -> Result<(), PlatformError> {
        if !config.install_dir.is_absolute() {
            return Err(PlatformError::Requirement(format!(
                "install directory {} is not absolute",
                config.install_dir.display()
            )));
        }
        if disk::nearest_existing_ancestor(&config.install_dir).is_none() {
            return Err(PlatformError::Requirement(format!(
                "drive for {} does not exist",
                config.install_dir.display()
            )));
        }
        Ok(())
    }

    fn is_elevated(&self) -> bool {
        self.elevated
    }

    fn requires_elevation(&self, target: &Path) -> bool {
        let lowered = target.display().to_string().to_ascii_lowercase();
        let under_system = system_prefixes().iter().any(|prefix| {
            lowered.starts_with(&prefix.display().to_string().to_ascii_lowercase())
        });
        if under_system {
            return true;
        }
        disk::nearest_existing_ancestor(target).is_some_and(|anchor| {
            matches!(disk::probe_writable(&anchor), Err(e) if e.kind() == io::ErrorKind::PermissionDenied)
        })
    }

    fn request_elevation(&self) -> Result<(), ElevationError> {
        if self.elevated {
            return Ok(());
        }
        let exe = env::current_exe().map_err(|e| ElevationError::Failed(e.to_string()))?;
        let args: Vec<String> = env::args().skip(1).collect();
        let script = elevation_script(&exe, &args);

        log::info!("Re-launching {} with RunAs", exe.display());
        let output = Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .output()
            .map_err(|e| ElevationError::Failed(format!("powershell: {e}")))?;

        let code = elevation_outcome(
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )?;
        log::info!("Elevated process finished with status {}", code);
        std::process::exit(code)
    }

    fn register_with_os(&self, receipt: &InstallReceipt) -> Result<(), PlatformError> {
        let location = receipt.install_dir.display().to_string();
        self.set_value("DisplayName", "REG_SZ", &receipt.app_name)?;
        self.set_value("DisplayVersion", "REG_SZ", &receipt.app_version)?;
        self.set_value("InstallLocation", "REG_SZ", &location)?;
        if let Some(publisher) = &receipt.publisher {
            self.set_value("Publisher", "REG_SZ", publisher)?;
        }
        log::info!("Registered {} under {}", self.app_name, self.uninstall_key());
        Ok(())
    }

    fn create_shortcuts(&self, config: &Config) -> Result<(), PlatformError> {
        let target = config.executable_path().ok_or_else(|| {
            PlatformError::Requirement("shortcuts need an executable".to_string())
        })?;
        let appdata = env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or_else(|| PlatformError::Requirement("APPDATA is not set".to_string()))?;
        let programs = appdata.join(r"Microsoft\Windows\Start Menu\Programs");
        fs::create_dir_all(&programs)?;
        let link = programs.join(format!("{}.lnk", config.app_name));

        let script = format!(
            "$s = (New-Object -ComObject WScript.Shell).CreateShortcut({}); $s.TargetPath = {}; $s.WorkingDirectory = {}; $s.Save()",
            powershell_quote(&link.display().to_string()),
            powershell_quote(&target.display().to_string()),
            powershell_quote(&config.install_dir.display().to_string()),
        );
        run("powershell", &["-NoProfile", "-NonInteractive", "-Command", &script])?;
        log::info!("Start menu shortcut written to {}", link.display());
        Ok(())
    }

    fn register_uninstaller(&self, receipt: &InstallReceipt) -> Result<(), PlatformError> {
        let manifest = receipt.install_dir.join(UNINSTALL_MANIFEST);
        fs::write(&manifest, serde_json::to_string_pretty(receipt)?)?;
        self.set_value("UninstallManifest", "REG_SZ", &manifest.display().to_string())?;
        self.set_value("NoModify", "REG_DWORD", "1")?;
        self.set_value("NoRepair", "REG_DWORD", "1")?;
        Ok(())
    }

    fn add_to_path(&self, dir: &Path) -> Result<(), PlatformError> {
        let mut entries = self.read_user_path()?;
        if entries.iter().any(|e| same_entry(e, dir)) {
            return Ok(());
        }
        entries.push(dir.display().to_string());
        self.write_user_path(&entries)?;
        log::info!("Added {} to the user PATH", dir.display());
        Ok(())
    }

    fn remove_from_path(&self, dir: &Path) -> Result<(), PlatformError> {
        let mut entries = self.read_user_path()?;
        let before = entries.len();
        entries.retain(|e| !same_entry(e, dir));
        if entries.len() != before {
            self.write_user_path(&entries)?;
            log::info!("Removed {} from the user PATH", dir.display());
        }
        Ok(())
    }

    fn is_in_path(&self, dir: &Path) -> Result<bool, PlatformError> {
        Ok(self.read_user_path()?.iter().any(|e| same_entry(e, dir)))
    }
}
