//! Monitored target registry
//!
//! The registry is the single source of truth for which apps and domains are
//! gated. It keeps no copy of the sets: every query reads the store, so an
//! update made by any component is seen by the very next evaluation.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::GateError;
use crate::store::KeyValueStore;
use crate::target::{Target, TargetKind};

pub const SELECTED_APPS_KEY: &str = "selectedApps";
pub const MONITORED_DOMAINS_KEY: &str = "monitoredDomains";

pub struct MonitoredTargetRegistry {
    store: Arc<dyn KeyValueStore>,
    host_app_id: String,
    // Serializes read-modify-write of the sets
    write_lock: Mutex<()>,
}

impl MonitoredTargetRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, host_app_id: impl Into<String>) -> Self {
        Self {
            store,
            host_app_id: host_app_id.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Identifier of the gate itself, never monitored
    pub fn host_app_id(&self) -> &str {
        &self.host_app_id
    }

    pub fn is_host(&self, id: &str) -> bool {
        id == self.host_app_id
    }

    pub fn monitored_apps(&self) -> Result<BTreeSet<String>, GateError> {
        Ok(self.store.get_string_set(SELECTED_APPS_KEY)?)
    }

    pub fn monitored_domains(&self) -> Result<BTreeSet<String>, GateError> {
        Ok(self.store.get_string_set(MONITORED_DOMAINS_KEY)?)
    }

    /// Every registered target, apps first
    pub fn monitored_targets(&self) -> Result<Vec<Target>, GateError> {
        let apps = self.monitored_apps()?.into_iter().map(Target::app);
        let domains = self.monitored_domains()?.into_iter().map(Target::domain);
        Ok(apps.chain(domains).collect())
    }

    /// Returns true if the app was not already monitored
    pub fn add_app(&self, id: &str) -> Result<bool, GateError> {
        let id = self.validate(id, TargetKind::App)?;
        self.update_set(SELECTED_APPS_KEY, |set| set.insert(id.clone()))
            .inspect(|added| {
                if *added {
                    info!("Monitoring app: {}", id);
                }
            })
    }

    /// Returns true if the app was monitored
    pub fn remove_app(&self, id: &str) -> Result<bool, GateError> {
        let id = id.trim();
        self.update_set(SELECTED_APPS_KEY, |set| set.remove(id))
            .inspect(|removed| {
                if *removed {
                    info!("Stopped monitoring app: {}", id);
                }
            })
    }

    /// Returns true if the domain was not already monitored
    pub fn add_domain(&self, domain: &str) -> Result<bool, GateError> {
        let domain = self.validate(domain, TargetKind::Domain)?;
        self.update_set(MONITORED_DOMAINS_KEY, |set| set.insert(domain.clone()))
            .inspect(|added| {
                if *added {
                    info!("Monitoring domain: {}", domain);
                }
            })
    }

    /// Returns true if the domain was monitored
    pub fn remove_domain(&self, domain: &str) -> Result<bool, GateError> {
        let domain = domain.trim().to_lowercase();
        self.update_set(MONITORED_DOMAINS_KEY, |set| set.remove(&domain))
            .inspect(|removed| {
                if *removed {
                    info!("Stopped monitoring domain: {}", domain);
                }
            })
    }

    /// Exact membership; the host app is never monitored
    pub fn is_app_monitored(&self, id: &str) -> Result<bool, GateError> {
        if self.is_host(id) {
            return Ok(false);
        }
        Ok(self.monitored_apps()?.contains(id))
    }

    /// True if `domain` contains any registered domain, ignoring case
    ///
    /// This is substring matching, not suffix matching: with `facebook`
    /// registered, both `m.facebook.com` and `myfacebookstory.org` match.
    pub fn is_domain_monitored(&self, domain: &str) -> Result<bool, GateError> {
        if self.is_host(domain) {
            return Ok(false);
        }
        let observed = domain.to_lowercase();
        let matched = self
            .monitored_domains()?
            .iter()
            .filter(|entry| !entry.is_empty())
            .find(|entry| observed.contains(&entry.to_lowercase()))
            .cloned();

        if let Some(entry) = &matched {
            debug!("Domain {} matched monitored entry {}", domain, entry);
        }
        Ok(matched.is_some())
    }

    pub fn is_monitored(&self, target: &Target) -> Result<bool, GateError> {
        match target.kind {
            TargetKind::App => self.is_app_monitored(&target.id),
            TargetKind::Domain => self.is_domain_monitored(&target.id),
        }
    }

    fn validate(&self, raw: &str, kind: TargetKind) -> Result<String, GateError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GateError::InvalidTarget(format!("{} identifier cannot be empty", kind)));
        }
        if self.is_host(trimmed) {
            return Err(GateError::InvalidTarget(format!(
                "'{}' is this app and cannot be monitored",
                trimmed
            )));
        }
        Ok(match kind {
            TargetKind::App => trimmed.to_string(),
            TargetKind::Domain => trimmed.to_lowercase(),
        })
    }

    fn update_set(
        &self,
        key: &str,
        edit: impl FnOnce(&mut BTreeSet<String>) -> bool,
    ) -> Result<bool, GateError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut set = self.store.get_string_set(key)?;
        if !edit(&mut set) {
            return Ok(false);
        }
        self.store.put_string_set(key, set)?;
        Ok(true)
    }
}
