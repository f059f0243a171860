// src/config.rs

use anyhow::{bail, Result};
use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind};
use notify::{RecursiveMode, Watcher};
use tracing::{error, warn};

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use configparser::ini::Ini;

/// Optional INI config file. Sections mirror the well-known profiles
/// (`[battery]`, `[balanced]`, `[performance]`, `[default]`) and may override
/// their `governor` and `turbo` (`always`/`never`) parameters.
pub struct Config {
    path: Arc<Mutex<PathBuf>>,
    config: Arc<Mutex<Ini>>,
    watcher: Arc<Mutex<Option<notify::RecommendedWatcher>>>,
}

impl Config {
    pub fn new() -> Self {
        Config {
            path: Arc::new(Mutex::new(PathBuf::new())),
            config: Arc::new(Mutex::new(Ini::new())),
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_path(&self, path: PathBuf) -> Result<()> {
        *self.path.lock().unwrap() = path.clone();

        if path.exists() {
            self.update_config()?;
        }

        self.setup_watcher(&path)?;

        Ok(())
    }

    /// Reload the file whenever it changes on disk, so a running primary
    /// instance picks up edits without a restart.
    fn setup_watcher(&self, path: &Path) -> Result<()> {
        let config_clone: Arc<Mutex<Ini>> = Arc::clone(&self.config);
        let path_clone = Arc::clone(&self.path);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let should_update = matches!(
                        event.kind,
                        EventKind::Create(CreateKind::File)
                            | EventKind::Modify(ModifyKind::Data(_))
                            | EventKind::Remove(RemoveKind::File)
                    );

                    if should_update {
                        let current_path = path_clone.lock().unwrap().clone();

                        if event.paths.iter().any(|p| p == &current_path) {
                            let mut new_config = Ini::new();
                            if new_config
                                .load(current_path.to_str().unwrap_or(""))
                                .is_ok()
                            {
                                *config_clone.lock().unwrap() = new_config;
                            }
                        }
                    }
                }
                Err(e) => warn!("config watch error: {:?}", e),
            }
        })?;

        if let Some(parent) = path.parent() {
            if parent.exists() {
                watcher.watch(parent, RecursiveMode::NonRecursive)?;
            }
        }

        *self.watcher.lock().unwrap() = Some(watcher);

        Ok(())
    }

    pub fn has_config(&self) -> bool {
        self.path.lock().unwrap().exists()
    }

    pub fn get_path(&self) -> PathBuf {
        self.path.lock().unwrap().clone()
    }

    pub fn update_config(&self) -> Result<()> {
        let path = self.path.lock().unwrap().clone();

        let mut new_config = Ini::new();
        match new_config.load(path.to_str().unwrap_or("")) {
            Ok(_) => {
                *self.config.lock().unwrap() = new_config;
                Ok(())
            }
            Err(e) => {
                // a malformed file should not take the whole tool down
                error!("error parsing config file: {}", e);
                Ok(())
            }
        }
    }

    pub fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.lock().unwrap().get(section, key)
    }

    pub fn get_bool(&self, section: &str, key: &str) -> Result<bool> {
        match self.get_string(section, key).as_deref() {
            Some("true") | Some("True") | Some("1") | Some("yes") | Some("Yes") => Ok(true),
            Some("false") | Some("False") | Some("0") | Some("no") | Some("No") => Ok(false),
            Some(v) => bail!("Invalid boolean value: {}", v),
            None => Ok(false),
        }
    }

    pub fn has_option(&self, section: &str, key: &str) -> bool {
        self.config.lock().unwrap().get(section, key).is_some()
    }

    pub fn get(&self, section: &str, key: &str, fallback: &str) -> String {
        self.get_string(section, key)
            .unwrap_or_else(|| fallback.to_string())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

// Global config instance
lazy_static::lazy_static! {
    pub static ref CONFIG: Config = Config::new();
}

/// Find the config file to use
///
/// Look for a config file in the following prioritization order:
/// 1. Command line argument
/// 2. User config file
/// 3. System config file
pub fn find_config_file(args_config_file: Option<&str>) -> PathBuf {
    let home = get_home_dir();

    let user_config_dir = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home.join(".config"));

    let user_config_file = user_config_dir.join("cpufreq-manager/cpufreq-manager.conf");
    let system_config_file = PathBuf::from("/etc/cpufreq-manager.conf");

    // (1) Command line argument was specified
    if let Some(config_path) = args_config_file {
        let path = PathBuf::from(config_path);
        if path.is_file() {
            return path;
        } else {
            error!("config file specified with '--config {}' not found", config_path);
            std::process::exit(1);
        }
    }

    // (2) User config file
    if user_config_file.is_file() {
        return user_config_file;
    }

    // (3) System config file (default if nothing else is found)
    system_config_file
}

fn get_home_dir() -> PathBuf {
    // Resolve through SUDO_USER so the right config is found under sudo
    let output = Command::new("sh")
        .arg("-c")
        .arg("getent passwd ${SUDO_USER:-$USER} | cut -d: -f6")
        .output();

    match output {
        Ok(output) if output.status.success() && !output.stdout.is_empty() => {
            let home = String::from_utf8_lossy(&output.stdout);
            PathBuf::from(home.trim())
        }
        _ => std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/root")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert!(!config.has_config());
        assert!(!config.has_option("battery", "governor"));
    }

    #[test]
    fn test_get_with_fallback() {
        let config = Config::new();
        assert_eq!(config.get("battery", "turbo", "auto"), "auto");
    }

    #[test]
    fn test_profile_overrides_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cpufreq-manager.conf");
        fs::write(&path, "[battery]\ngovernor = conservative\nturbo = never\n").unwrap();

        let config = Config::new();
        config.set_path(path).unwrap();

        assert!(config.has_config());
        assert_eq!(config.get("battery", "governor", ""), "conservative");
        assert_eq!(config.get("battery", "turbo", "auto"), "never");
        assert!(!config.has_option("performance", "governor"));
    }

    #[test]
    fn test_get_bool() {
        let config = Config::new();
        assert!(!config.get_bool("general", "missing").unwrap());
    }
}
