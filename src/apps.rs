use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An application the user could choose to gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Enumerates installed applications
pub trait AppCatalog: Send + Sync {
    fn installed_apps(&self) -> anyhow::Result<Vec<InstalledApp>>;
}

/// Sort apps case-insensitively by display name, ids break ties
pub fn sort_by_display_name(apps: &mut [InstalledApp]) {
    apps.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Installed apps that are not monitored, never including the host app itself
pub fn non_selected(
    apps: Vec<InstalledApp>,
    selected: &BTreeSet<String>,
    host_app_id: &str,
) -> Vec<InstalledApp> {
    let mut apps: Vec<InstalledApp> = apps
        .into_iter()
        .filter(|app| app.id != host_app_id && !selected.contains(&app.id))
        .collect();
    sort_by_display_name(&mut apps);
    apps
}
