use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Atomically write content to a file
///
/// Writes to a temporary file in the same directory, syncs it to disk, then
/// renames it over the target path. Readers never observe a partial file.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory_exists(parent)?;
    }

    let temp_path = path.with_extension("tmp");

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    std::fs::rename(&temp_path, path)
}

/// Ensure a directory exists, creating it and all parents if needed
pub fn ensure_directory_exists(path: &Path) -> io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Platform data directory for puzzle-gate files
pub fn data_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        // Prefer the per-user location; the gate runs in the user's session
        if let Some(dirs) = directories::ProjectDirs::from("", "", "puzzle-gate") {
            return Ok(dirs.data_local_dir().to_path_buf());
        }
        Ok(PathBuf::from("/var/lib/puzzle-gate"))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(PathBuf::from("/Library/Application Support/puzzle-gate"))
    }

    #[cfg(target_os = "windows")]
    {
        let mut path = PathBuf::from(
            std::env::var("ProgramData").unwrap_or_else(|_| "C:\\ProgramData".to_string()),
        );
        path.push("puzzle-gate");
        Ok(path)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        anyhow::bail!("Unsupported operating system");
    }
}

/// Run a command, returning Ok if it exited successfully
pub fn try_command(cmd: &str, args: &[&str]) -> anyhow::Result<()> {
    let output = Command::new(cmd).args(args).output()?;

    if output.status.success() {
        Ok(())
    } else {
        anyhow::bail!(
            "Command failed: {} {:?}: {}",
            cmd,
            args,
            String::from_utf8_lossy(&output.stderr).trim()
        )
    }
}

/// Run a command, returning its trimmed stdout on success
pub fn command_output(cmd: &str, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new(cmd).args(args).output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        anyhow::bail!(
            "Command failed: {} {:?}: {}",
            cmd,
            args,
            String::from_utf8_lossy(&output.stderr).trim()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parent_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.json");

        atomic_write(&path, b"{}").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn command_output_fails_for_missing_command() {
        assert!(command_output("nonexistent_command_xyz", &[]).is_err());
    }

    #[test]
    fn try_command_with_invalid_command() {
        assert!(try_command("nonexistent_command_xyz", &[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn failed_command_reports_stderr() {
        let script = "echo 'no display available' >&2; exit 1";

        let err = try_command("sh", &["-c", script]).unwrap_err();
        assert!(err.to_string().contains("no display available"));

        let err = command_output("sh", &["-c", script]).unwrap_err();
        assert!(err.to_string().contains("no display available"));
    }
}
