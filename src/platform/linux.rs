use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::apps::InstalledApp;
use crate::platform::common::{command_output, try_command};

/// Process name of the focused X11 window
pub fn foreground_app() -> Result<Option<String>> {
    let pid = command_output("xdotool", &["getactivewindow", "getwindowpid"])
        .context("Failed to query the active window (is xdotool installed?)")?;
    if pid.is_empty() {
        return Ok(None);
    }

    let pid: u32 = pid
        .parse()
        .with_context(|| format!("Unexpected window pid: {}", pid))?;
    let comm = std::fs::read_to_string(format!("/proc/{}/comm", pid))
        .with_context(|| format!("Failed to read process name for pid {}", pid))?;

    let comm = comm.trim();
    Ok((!comm.is_empty()).then(|| comm.to_string()))
}

/// Launch an app by desktop id, falling back to running it as a command
pub fn launch_app(app_id: &str) -> Result<()> {
    // 1. Desktop entry (matches ids from installed_apps)
    if try_command("gtk-launch", &[app_id]).is_ok() {
        return Ok(());
    }

    // 2. Plain executable on PATH
    if Command::new(app_id)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .is_ok()
    {
        return Ok(());
    }

    anyhow::bail!("No desktop entry or executable named '{}'", app_id)
}

/// Send a desktop notification
pub fn notify(title: &str, message: &str) -> Result<()> {
    try_command("notify-send", &[title, message, "--icon=dialog-information"])
}

fn application_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/share/applications"),
        PathBuf::from("/usr/local/share/applications"),
    ];
    if let Some(base) = directories::BaseDirs::new() {
        dirs.push(base.data_dir().join("applications"));
    }
    dirs
}

/// Visible applications from the XDG desktop entry directories
///
/// Later directories override earlier ones, so per-user entries win.
pub fn installed_apps() -> Result<Vec<InstalledApp>> {
    let mut apps = BTreeMap::new();
    for dir in application_dirs() {
        for app in read_desktop_dir(&dir)? {
            apps.insert(app.id.clone(), app);
        }
    }
    Ok(apps.into_values().collect())
}

fn read_desktop_dir(dir: &Path) -> Result<Vec<InstalledApp>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut apps = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("desktop") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => apps.extend(parse_desktop_entry(id, &content)),
            Err(e) => debug!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(apps)
}

/// Parse the `[Desktop Entry]` group of a .desktop file
///
/// Returns None for hidden entries and anything that is not an application.
pub fn parse_desktop_entry(id: &str, content: &str) -> Option<InstalledApp> {
    let mut in_entry = false;
    let mut name = None;
    let mut icon = None;
    let mut is_application = false;

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match (key.trim(), value.trim()) {
            ("Name", value) => name = Some(value.to_string()),
            ("Icon", value) if !value.is_empty() => icon = Some(value.to_string()),
            ("Type", value) => is_application = value == "Application",
            ("NoDisplay" | "Hidden", "true") => return None,
            _ => {}
        }
    }

    if !is_application {
        return None;
    }
    Some(InstalledApp {
        id: id.to_string(),
        display_name: name.unwrap_or_else(|| id.to_string()),
        icon,
    })
}
