// src/settings.rs

use anyhow::{Context, Result};
use chrono::Local;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use crate::profile::Profile;

#[derive(Debug, Serialize, Deserialize)]
struct SettingsData {
    /// Remember applied profiles and restore the last one on start.
    save: bool,
    /// Reference to the last applied profile: a well-known keyword or the
    /// GUID of a user-defined profile.
    guid: String,
    #[serde(default)]
    applied_at: Option<String>,
    /// The single mutable "user" profile slot.
    #[serde(default)]
    user_profile: Option<Profile>,
    /// User-defined profiles, addressed by GUID.
    #[serde(default)]
    profiles: Vec<Profile>,
}

impl Default for SettingsData {
    fn default() -> Self {
        Self {
            save: true,
            guid: "balanced".to_string(),
            applied_at: None,
            user_profile: None,
            profiles: Vec::new(),
        }
    }
}

/// Persisted application state, stored as JSON in the user data directory.
pub struct Settings {
    path: PathBuf,
    data: SettingsData,
}

impl Settings {
    pub fn load_default() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "cpufreq-manager")
            .context("could not determine user data directory")?;
        Self::load(dirs.data_dir().join("settings.json"))
    }

    /// Load settings from `path`, falling back to defaults when the file does
    /// not exist. User-defined profiles loaded without a GUID get one
    /// assigned and persisted, so they stay addressable.
    pub fn load(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            SettingsData::default()
        };

        let mut assigned = false;
        for profile in &mut data.profiles {
            if profile.guid.is_empty() {
                profile.guid = Uuid::new_v4().to_string();
                assigned = true;
            }
        }

        let settings = Self { path, data };
        if assigned {
            settings.store()?;
        }
        Ok(settings)
    }

    pub fn save(&self) -> bool {
        self.data.save
    }

    pub fn set_save(&mut self, save: bool) {
        self.data.save = save;
    }

    pub fn guid(&self) -> &str {
        &self.data.guid
    }

    /// Record `guid` as the last applied profile reference, stamped with the
    /// application time.
    pub fn set_guid(&mut self, guid: &str) {
        self.data.guid = guid.to_string();
        self.data.applied_at = Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
    }

    pub fn applied_at(&self) -> Option<&str> {
        self.data.applied_at.as_deref()
    }

    pub fn user_profile(&self) -> Option<&Profile> {
        self.data.user_profile.as_ref()
    }

    pub fn set_user_profile(&mut self, mut profile: Profile) {
        if profile.guid.is_empty() {
            profile.guid = Uuid::new_v4().to_string();
        }
        self.data.user_profile = Some(profile);
    }

    /// Look up a user-defined profile by GUID. Resolution is fresh on each
    /// call; nothing is cached.
    pub fn get_profile(&self, guid: &str) -> Option<&Profile> {
        self.data.profiles.iter().find(|p| p.guid == guid)
    }

    /// Add or replace a user-defined profile, assigning a GUID if it has
    /// none yet. Returns the GUID it is addressable under.
    pub fn add_profile(&mut self, mut profile: Profile) -> String {
        if profile.guid.is_empty() {
            profile.guid = Uuid::new_v4().to_string();
        }
        let guid = profile.guid.clone();
        match self.data.profiles.iter_mut().find(|p| p.guid == guid) {
            Some(existing) => *existing = profile,
            None => self.data.profiles.push(profile),
        }
        guid
    }

    /// Re-read the file, picking up changes persisted by another process
    /// instance.
    pub fn reload(&mut self) -> Result<()> {
        if self.path.exists() {
            let raw = fs::read_to_string(&self.path)
                .with_context(|| format!("failed to read {}", self.path.display()))?;
            self.data = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", self.path.display()))?;
        }
        Ok(())
    }

    pub fn store(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!("settings stored to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile(guid: &str, name: &str) -> Profile {
        Profile {
            guid: guid.to_string(),
            name: name.to_string(),
            governor: "powersave".to_string(),
            min_freq_pct: 0,
            max_freq_pct: 60,
            turbo: false,
        }
    }

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(dir.path().join("settings.json")).unwrap();
        assert!(settings.save());
        assert_eq!(settings.guid(), "balanced");
        assert!(settings.user_profile().is_none());
    }

    #[test]
    fn test_store_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::load(path.clone()).unwrap();
        settings.set_guid("performance");
        settings.set_save(false);
        settings.set_user_profile(profile("", "Mine"));
        settings.store().unwrap();

        let reloaded = Settings::load(path).unwrap();
        assert_eq!(reloaded.guid(), "performance");
        assert!(!reloaded.save());
        assert!(reloaded.applied_at().is_some());
        // the user profile got a GUID assigned before storing
        assert!(!reloaded.user_profile().unwrap().guid.is_empty());
    }

    #[test]
    fn test_get_profile_by_guid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::load(path.clone()).unwrap();
        let guid = settings.add_profile(profile("abc-123", "Quiet"));
        assert_eq!(guid, "abc-123");
        settings.store().unwrap();

        let reloaded = Settings::load(path).unwrap();
        assert_eq!(reloaded.get_profile("abc-123").unwrap().name, "Quiet");
        assert!(reloaded.get_profile("missing").is_none());
    }

    #[test]
    fn test_reload_picks_up_external_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut ours = Settings::load(path.clone()).unwrap();
        assert_eq!(ours.guid(), "balanced");

        // another process applies and persists a profile
        let mut theirs = Settings::load(path).unwrap();
        theirs.set_guid("battery");
        theirs.store().unwrap();

        ours.reload().unwrap();
        assert_eq!(ours.guid(), "battery");
    }

    #[test]
    fn test_loaded_profiles_without_guid_get_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"save": true, "guid": "balanced",
                "profiles": [{"guid": "", "name": "Quiet", "governor": "powersave"}]}"#,
        )
        .unwrap();

        let settings = Settings::load(path.clone()).unwrap();
        let guid = settings.data.profiles[0].guid.clone();
        assert!(!guid.is_empty());

        // the assignment was persisted
        let reloaded = Settings::load(path).unwrap();
        assert_eq!(reloaded.get_profile(&guid).unwrap().name, "Quiet");
    }
}
