use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use crate::apps::InstalledApp;
use crate::platform::common::{command_output, try_command};

const APPLICATIONS_DIR: &str = "/Applications";

/// Bundle identifier of the frontmost application
pub fn foreground_app() -> Result<Option<String>> {
    let id = command_output(
        "osascript",
        &[
            "-e",
            "tell application \"System Events\" to get bundle identifier of first application process whose frontmost is true",
        ],
    )
    .context("Failed to query the frontmost application")?;

    Ok((!id.is_empty() && id != "missing value").then_some(id))
}

/// Launch an app by bundle identifier
pub fn launch_app(bundle_id: &str) -> Result<()> {
    try_command("open", &["-b", bundle_id])
}

/// Send a notification through Notification Center
pub fn notify(title: &str, message: &str) -> Result<()> {
    let script = format!(
        "display notification \"{}\" with title \"{}\"",
        message.replace('"', "'"),
        title.replace('"', "'")
    );
    try_command("osascript", &["-e", &script])
}

/// Application bundles in /Applications
pub fn installed_apps() -> Result<Vec<InstalledApp>> {
    let mut apps = Vec::new();
    let entries = std::fs::read_dir(APPLICATIONS_DIR)
        .with_context(|| format!("Failed to list {}", APPLICATIONS_DIR))?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("app") {
            continue;
        }
        match bundle_app(&path) {
            Ok(app) => apps.push(app),
            Err(e) => debug!("Skipping {}: {:#}", path.display(), e),
        }
    }
    Ok(apps)
}

fn bundle_app(path: &Path) -> Result<InstalledApp> {
    let info = path.join("Contents").join("Info");
    let info = info.to_string_lossy();
    let id = command_output("defaults", &["read", &info, "CFBundleIdentifier"])?;
    let display_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.clone());
    let icon = command_output("defaults", &["read", &info, "CFBundleIconFile"]).ok();

    Ok(InstalledApp {
        id,
        display_name,
        icon,
    })
}
