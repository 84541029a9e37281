/// Platform-specific integrations: foreground detection, app launch,
/// installed-app enumeration and desktop notifications

pub mod common;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod linux;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::apps::{AppCatalog, InstalledApp};
use crate::challenge::{AppLauncher, LaunchParams};
use crate::error::GateError;
use crate::policy::UNKNOWN_PACKAGE;
use crate::sources::{UsageEvent, UsageEventKind, UsageProbe};

pub use common::{atomic_write, data_dir, ensure_directory_exists};

/// Identifier of the app currently in the foreground, if any
pub fn foreground_app() -> Result<Option<String>> {
    #[cfg(target_os = "windows")]
    {
        windows::foreground_app()
    }

    #[cfg(target_os = "macos")]
    {
        macos::foreground_app()
    }

    #[cfg(target_os = "linux")]
    {
        linux::foreground_app()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        anyhow::bail!("Unsupported operating system for foreground detection")
    }
}

/// Launch an app by its platform identifier
pub fn launch_app(app_id: &str) -> Result<()> {
    #[cfg(target_os = "windows")]
    {
        windows::launch_app(app_id)
    }

    #[cfg(target_os = "macos")]
    {
        macos::launch_app(app_id)
    }

    #[cfg(target_os = "linux")]
    {
        linux::launch_app(app_id)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        anyhow::bail!("Unsupported operating system for launching {}", app_id)
    }
}

/// Enumerate installed applications
pub fn installed_apps() -> Result<Vec<InstalledApp>> {
    #[cfg(target_os = "windows")]
    {
        windows::installed_apps()
    }

    #[cfg(target_os = "macos")]
    {
        macos::installed_apps()
    }

    #[cfg(target_os = "linux")]
    {
        linux::installed_apps()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        Ok(Vec::new())
    }
}

/// Best-effort desktop notification
pub fn notify(title: &str, message: &str) -> Result<()> {
    #[cfg(target_os = "windows")]
    {
        windows::notify(title, message)
    }

    #[cfg(target_os = "macos")]
    {
        macos::notify(title, message)
    }

    #[cfg(target_os = "linux")]
    {
        linux::notify(title, message)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        tracing::warn!("Notification: {} - {}", title, message);
        Ok(())
    }
}

/// Usage probe backed by the desktop's focused window
///
/// Desktops only expose the current foreground app, so each query yields at
/// most one event stamped at the end of the window.
pub struct ForegroundProbe;

impl UsageProbe for ForegroundProbe {
    fn query_events(&self, _begin: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UsageEvent>> {
        Ok(foreground_app()?
            .map(|package| UsageEvent {
                package,
                kind: UsageEventKind::ActivityResumed,
                timestamp: end,
            })
            .into_iter()
            .collect())
    }
}

/// Relaunches gated apps through the platform launcher
pub struct SystemAppLauncher;

impl AppLauncher for SystemAppLauncher {
    fn launch(&self, params: &LaunchParams) -> Result<(), GateError> {
        if params.package_id == UNKNOWN_PACKAGE {
            return Err(GateError::TargetResolutionFailure {
                package: params.package_id.clone(),
                reason: format!(
                    "no app is known for domain {}",
                    params.domain.as_deref().unwrap_or("-")
                ),
            });
        }

        launch_app(&params.package_id).map_err(|e| GateError::TargetResolutionFailure {
            package: params.package_id.clone(),
            reason: format!("{:#}", e),
        })
    }
}

/// App catalog backed by the platform's installed-app listing
pub struct SystemCatalog;

impl AppCatalog for SystemCatalog {
    fn installed_apps(&self) -> Result<Vec<InstalledApp>> {
        installed_apps()
    }
}
