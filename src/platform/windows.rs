use anyhow::{Context, Result};
use tracing::warn;

use crate::apps::InstalledApp;
use crate::platform::common::{command_output, try_command};

pub fn foreground_app() -> Result<Option<String>> {
    anyhow::bail!("Foreground app detection is not supported on Windows; use a window or traffic source")
}

/// Launch a Start menu app by its AppID
pub fn launch_app(app_id: &str) -> Result<()> {
    let target = format!("shell:AppsFolder\\{}", app_id);
    try_command("cmd", &["/C", "start", "", &target])
}

pub fn notify(title: &str, message: &str) -> Result<()> {
    // Toasts need the WinRT bindings; log instead
    warn!("Notification: {} - {}", title, message);
    Ok(())
}

/// Start menu apps as reported by Get-StartApps
pub fn installed_apps() -> Result<Vec<InstalledApp>> {
    let output = command_output(
        "powershell",
        &[
            "-NoProfile",
            "-Command",
            "Get-StartApps | ForEach-Object { \"$($_.Name)`t$($_.AppID)\" }",
        ],
    )
    .context("Failed to enumerate Start menu apps")?;

    Ok(parse_start_apps(&output))
}

/// Parse `name<TAB>appid` lines
pub fn parse_start_apps(output: &str) -> Vec<InstalledApp> {
    output
        .lines()
        .filter_map(|line| {
            let (name, id) = line.trim_end().split_once('\t')?;
            let (name, id) = (name.trim(), id.trim());
            if id.is_empty() {
                return None;
            }
            let display_name = if name.is_empty() { id } else { name };
            Some(InstalledApp {
                id: id.to_string(),
                display_name: display_name.to_string(),
                icon: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_apps_output() {
        let output = "Calculator\tMicrosoft.WindowsCalculator_8wekyb3d8bbwe!App\n\tOrphan.Id\nbroken line\n";
        let apps = parse_start_apps(output);

        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].display_name, "Calculator");
        assert_eq!(apps[1].display_name, "Orphan.Id");
    }
}
