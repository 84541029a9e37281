use anyhow::Result;

use crate::apps::{self, AppCatalog};
use crate::cli::{AppsCommands, DomainsCommands};
use crate::commands::utils::open_registry;
use crate::config::GateConfig;
use crate::registry::MonitoredTargetRegistry;

pub fn run_apps_command(
    command: AppsCommands,
    config: &GateConfig,
    catalog: &dyn AppCatalog,
) -> Result<()> {
    let (_store, registry) = open_registry(config)?;

    match command {
        AppsCommands::Add { id } => {
            if registry.add_app(&id)? {
                println!("✓ Now gating app {}", id.trim());
            } else {
                println!("App {} is already gated", id.trim());
            }
        }
        AppsCommands::Remove { id } => {
            if registry.remove_app(&id)? {
                println!("✓ No longer gating app {}", id.trim());
            } else {
                println!("App {} was not gated", id.trim());
            }
        }
        AppsCommands::List => list(&registry.monitored_apps()?, "apps"),
        AppsCommands::Available => available(&registry, catalog)?,
    }

    Ok(())
}

pub fn run_domains_command(command: DomainsCommands, config: &GateConfig) -> Result<()> {
    let (_store, registry) = open_registry(config)?;

    match command {
        DomainsCommands::Add { domain } => {
            if registry.add_domain(&domain)? {
                println!("✓ Now gating hostnames containing '{}'", domain.trim().to_lowercase());
            } else {
                println!("Domain {} is already gated", domain.trim());
            }
        }
        DomainsCommands::Remove { domain } => {
            if registry.remove_domain(&domain)? {
                println!("✓ No longer gating domain {}", domain.trim().to_lowercase());
            } else {
                println!("Domain {} was not gated", domain.trim());
            }
        }
        DomainsCommands::List => list(&registry.monitored_domains()?, "domains"),
    }

    Ok(())
}

fn list<'a>(ids: impl IntoIterator<Item = &'a String>, what: &str) {
    let mut empty = true;
    for id in ids {
        println!("  - {}", id);
        empty = false;
    }
    if empty {
        println!("No {} are gated", what);
    }
}

fn available(registry: &MonitoredTargetRegistry, catalog: &dyn AppCatalog) -> Result<()> {
    let installed = catalog.installed_apps()?;
    let selected = registry.monitored_apps()?;
    let remaining = apps::non_selected(installed, &selected, registry.host_app_id());

    if remaining.is_empty() {
        println!("No other installed apps found");
        return Ok(());
    }

    let width = remaining
        .iter()
        .map(|app| app.display_name.chars().count())
        .max()
        .unwrap_or(0);
    for app in remaining {
        println!("  {:width$}  {}", app.display_name, app.id, width = width);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::InstalledApp;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    struct FixedCatalog(Vec<InstalledApp>);

    impl AppCatalog for FixedCatalog {
        fn installed_apps(&self) -> Result<Vec<InstalledApp>> {
            Ok(self.0.clone())
        }
    }

    fn config_in(dir: &assert_fs::TempDir) -> GateConfig {
        GateConfig {
            store_path: Some(dir.child("preferences.json").path().to_path_buf()),
            ..GateConfig::default()
        }
    }

    #[test]
    fn apps_and_domains_persist_to_store() {
        let dir = assert_fs::TempDir::new().unwrap();
        let config = config_in(&dir);
        let catalog = FixedCatalog(Vec::new());

        run_apps_command(AppsCommands::Add { id: " com.example.social ".into() }, &config, &catalog)
            .unwrap();
        run_domains_command(DomainsCommands::Add { domain: "Facebook".into() }, &config).unwrap();

        dir.child("preferences.json")
            .assert(predicate::str::contains("com.example.social"))
            .assert(predicate::str::contains("facebook"));

        let (_store, registry) = open_registry(&config).unwrap();
        assert!(registry.is_app_monitored("com.example.social").unwrap());

        run_apps_command(AppsCommands::Remove { id: "com.example.social".into() }, &config, &catalog)
            .unwrap();
        let (_store, registry) = open_registry(&config).unwrap();
        assert!(!registry.is_app_monitored("com.example.social").unwrap());
    }

    #[test]
    fn adding_the_host_app_fails() {
        let dir = assert_fs::TempDir::new().unwrap();
        let config = config_in(&dir);

        let result = run_apps_command(
            AppsCommands::Add { id: config.host_app_id.clone() },
            &config,
            &FixedCatalog(Vec::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn available_lists_from_catalog() {
        let dir = assert_fs::TempDir::new().unwrap();
        let config = config_in(&dir);
        let catalog = FixedCatalog(vec![InstalledApp {
            id: "org.example.notes".into(),
            display_name: "Notes".into(),
            icon: None,
        }]);

        assert!(run_apps_command(AppsCommands::Available, &config, &catalog).is_ok());
    }
}
