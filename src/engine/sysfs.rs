// src/engine/sysfs.rs

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, error, info, warn};

use super::FrequencyEngine;
use crate::config::CONFIG;
use crate::mainloop::{Event, EventSender};
use crate::profile::{Profile, ProfileRef};
use crate::settings::Settings;

const SYS_CPU_DIR: &str = "/sys/devices/system/cpu";

/// Governors in preference order, most to least aggressive.
pub const ALL_GOVERNORS: &[&str] = &[
    "performance",
    "ondemand",
    "conservative",
    "schedutil",
    "userspace",
    "powersave",
];

/// Applies profiles through the Linux cpufreq sysfs interface: per-core
/// `scaling_governor` and `scaling_{min,max}_freq`, plus the turbo control
/// (intel_pstate `no_turbo` or acpi-cpufreq `boost`).
pub struct SysfsEngine {
    root: PathBuf,
    cpus: Vec<usize>,
    available_governors: Vec<String>,
    notifier: EventSender,
    settings: Option<Rc<RefCell<Settings>>>,
}

impl SysfsEngine {
    pub fn new(notifier: EventSender) -> Self {
        Self::with_root(PathBuf::from(SYS_CPU_DIR), notifier)
    }

    /// Engine rooted at an arbitrary directory laid out like
    /// `/sys/devices/system/cpu`.
    pub fn with_root(root: PathBuf, notifier: EventSender) -> Self {
        let cpus = scan_cpus(&root);
        let available_governors = probe_available_governors(&root);
        Self {
            root,
            cpus,
            available_governors,
            notifier,
            settings: None,
        }
    }

    /// Resolve a profile reference; `None` for an unknown GUID or an empty
    /// `user` slot.
    fn resolve(&self, id: &ProfileRef) -> Option<Profile> {
        match id {
            ProfileRef::Default => Some(self.default_profile()),
            ProfileRef::Battery => Some(self.battery_profile()),
            ProfileRef::Balanced => Some(self.balanced_profile()),
            ProfileRef::Performance => Some(self.performance_profile()),
            ProfileRef::System => Some(Profile::system()),
            ProfileRef::User => self
                .settings
                .as_ref()
                .and_then(|s| s.borrow().user_profile().cloned()),
            ProfileRef::Guid(guid) => self
                .settings
                .as_ref()
                .and_then(|s| s.borrow().get_profile(guid).cloned()),
        }
    }

    /// Pick a governor: config override first, then the first preference the
    /// kernel advertises.
    fn pick_governor(&self, section: &str, preferred: &[&str]) -> String {
        if CONFIG.has_option(section, "governor") {
            let gov = CONFIG.get(section, "governor", "");
            if self.available_governors.iter().any(|g| g == &gov) {
                return gov;
            }
            warn!("configured governor `{}` is not available, ignoring", gov);
        }

        preferred
            .iter()
            .find(|g| self.available_governors.iter().any(|a| a == *g))
            .map(|g| g.to_string())
            .or_else(|| self.available_governors.first().cloned())
            .unwrap_or_else(|| "schedutil".to_string())
    }

    fn pick_turbo(&self, section: &str, fallback: bool) -> bool {
        match CONFIG.get(section, "turbo", "auto").as_str() {
            "always" => true,
            "never" => false,
            _ => fallback,
        }
    }

    fn known_profile(
        &self,
        key: &str,
        name: &str,
        preferred: &[&str],
        min_freq_pct: u8,
        max_freq_pct: u8,
        turbo: bool,
    ) -> Profile {
        Profile {
            guid: key.to_string(),
            name: name.to_string(),
            governor: self.pick_governor(key, preferred),
            min_freq_pct,
            max_freq_pct,
            turbo: self.pick_turbo(key, turbo),
        }
    }

    fn cpufreq_dir(&self, cpu: usize) -> PathBuf {
        self.root.join(format!("cpu{}/cpufreq", cpu))
    }

    fn hardware_range(&self, cpu: usize) -> Result<(u64, u64)> {
        let dir = self.cpufreq_dir(cpu);
        let min = read_khz(&dir.join("cpuinfo_min_freq"))?;
        let max = read_khz(&dir.join("cpuinfo_max_freq"))?;
        Ok((min, max))
    }

    fn write_core(&self, cpu: usize, profile: &Profile) -> Result<()> {
        let dir = self.cpufreq_dir(cpu);

        fs::write(dir.join("scaling_governor"), &profile.governor)
            .with_context(|| format!("failed to set governor on cpu{}", cpu))?;

        let (hw_min, hw_max) = self.hardware_range(cpu)?;
        let span = hw_max.saturating_sub(hw_min);
        let min = hw_min + span * u64::from(profile.min_freq_pct) / 100;
        let max = hw_min + span * u64::from(profile.max_freq_pct) / 100;

        fs::write(dir.join("scaling_min_freq"), min.to_string())
            .with_context(|| format!("failed to set min frequency on cpu{}", cpu))?;
        fs::write(dir.join("scaling_max_freq"), max.to_string())
            .with_context(|| format!("failed to set max frequency on cpu{}", cpu))?;

        Ok(())
    }

    fn set_turbo(&self, enable: bool) -> Result<()> {
        let p_state = self.root.join("intel_pstate/no_turbo");
        let boost = self.root.join("cpufreq/boost");

        // intel_pstate's knob is inverted
        let (control_file, value) = if p_state.exists() {
            (p_state, !enable)
        } else if boost.exists() {
            (boost, enable)
        } else {
            debug!("no turbo control available, skipping");
            return Ok(());
        };

        fs::write(&control_file, format!("{}\n", value as u8))
            .with_context(|| format!("failed to write {}", control_file.display()))
    }

    fn apply(&self, profile: &Profile) -> Result<()> {
        let fallback;
        let profile = if profile.governor.is_empty() {
            // "system": hand control back to the driver defaults
            fallback = self.default_profile();
            &fallback
        } else {
            profile
        };

        for &cpu in &self.cpus {
            self.write_core(cpu, profile)?;
        }
        self.set_turbo(profile.turbo)?;

        Ok(())
    }
}

impl FrequencyEngine for SysfsEngine {
    fn init(&mut self, settings: Rc<RefCell<Settings>>) -> Result<()> {
        if self.settings.is_some() {
            return Ok(());
        }

        if !nix::unistd::Uid::effective().is_root() {
            warn!("running without root privileges, profile application will likely fail");
        }
        debug!(
            "engine ready: {} cpus, governors: {}",
            self.cpus.len(),
            self.available_governors.join(" ")
        );

        self.settings = Some(settings);
        Ok(())
    }

    fn apply_profile(&mut self, id: &ProfileRef, save: bool) -> Result<()> {
        let resolved = self.resolve(id);

        let profile = match resolved {
            Some(profile) => {
                info!("applying profile `{}`", profile.name);
                match self.apply(&profile) {
                    Ok(()) => {
                        if save {
                            if let Some(settings) = self.settings.as_ref() {
                                let mut settings = settings.borrow_mut();
                                settings.set_guid(id.key());
                                if let Err(e) = settings.store() {
                                    warn!("failed to persist applied profile: {:#}", e);
                                }
                            }
                        }
                    }
                    Err(e) => error!("failed to apply profile `{}`: {:#}", profile.name, e),
                }
                profile
            }
            None => {
                error!("unknown profile: `{}`", id);
                Profile::system()
            }
        };

        // completion is unconditional; observers decide what to make of it
        let _ = self.notifier.send(Event::ProfileChanged(profile));
        Ok(())
    }

    fn default_profile(&self) -> Profile {
        self.known_profile(
            "default",
            "Default",
            &["schedutil", "ondemand", "conservative"],
            0,
            100,
            true,
        )
    }

    fn battery_profile(&self) -> Profile {
        self.known_profile(
            "battery",
            "Battery",
            &["powersave", "conservative", "schedutil", "ondemand"],
            0,
            60,
            false,
        )
    }

    fn balanced_profile(&self) -> Profile {
        self.known_profile(
            "balanced",
            "Balanced",
            &["schedutil", "ondemand", "conservative"],
            0,
            100,
            true,
        )
    }

    fn performance_profile(&self) -> Profile {
        self.known_profile(
            "performance",
            "Performance",
            &["performance", "schedutil", "ondemand"],
            30,
            100,
            true,
        )
    }
}

fn scan_cpus(root: &Path) -> Vec<usize> {
    let mut cpus: Vec<usize> = fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    e.file_name()
                        .to_str()
                        .and_then(|name| name.strip_prefix("cpu"))
                        .and_then(|id| id.parse::<usize>().ok())
                })
                .collect()
        })
        .unwrap_or_default();

    if cpus.is_empty() {
        cpus = (0..num_cpus::get()).collect();
    }
    cpus.sort_unstable();
    cpus
}

fn probe_available_governors(root: &Path) -> Vec<String> {
    let available: Vec<String> =
        fs::read_to_string(root.join("cpu0/cpufreq/scaling_available_governors"))
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

    // keep ALL_GOVERNORS preference order
    ALL_GOVERNORS
        .iter()
        .filter(|g| available.iter().any(|a| a == *g))
        .map(|g| g.to_string())
        .collect()
}

fn read_khz(path: &Path) -> Result<u64> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    raw.trim()
        .parse()
        .with_context(|| format!("malformed frequency in {}", path.display()))
}
