// src/engine/mod.rs

pub mod sysfs;

pub use sysfs::SysfsEngine;

use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;

use crate::profile::{Profile, ProfileRef};
use crate::settings::Settings;

/// Hardware-facing side of profile application.
///
/// `apply_profile` is asynchronous from the caller's point of view: its
/// outcome is observable only through the profile-changed notification the
/// engine posts to the event loop. The notification is unconditional — an
/// engine-level failure is reported through the engine's own logging, not
/// through the notification path.
pub trait FrequencyEngine {
    /// Bind the engine to the settings store. Idempotent.
    fn init(&mut self, settings: Rc<RefCell<Settings>>) -> Result<()>;

    /// Resolve `id` and apply it to the hardware, persisting the reference
    /// when `save` is set. Completion arrives later as an
    /// [`Event::ProfileChanged`](crate::mainloop::Event) on the loop.
    fn apply_profile(&mut self, id: &ProfileRef, save: bool) -> Result<()>;

    fn default_profile(&self) -> Profile;
    fn battery_profile(&self) -> Profile;
    fn balanced_profile(&self) -> Profile;
    fn performance_profile(&self) -> Profile;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    #[derive(Default)]
    pub struct MockState {
        pub init_calls: usize,
        pub applied: Vec<(ProfileRef, bool)>,
    }

    /// Records calls; completion notifications are posted by the test itself,
    /// mirroring the asynchronous contract.
    pub struct MockEngine {
        pub state: Rc<RefCell<MockState>>,
    }

    impl MockEngine {
        pub fn new() -> (Self, Rc<RefCell<MockState>>) {
            let state = Rc::new(RefCell::new(MockState::default()));
            (
                Self {
                    state: Rc::clone(&state),
                },
                state,
            )
        }

        fn named(guid: &str, name: &str) -> Profile {
            Profile {
                guid: guid.to_string(),
                name: name.to_string(),
                governor: "schedutil".to_string(),
                min_freq_pct: 0,
                max_freq_pct: 100,
                turbo: true,
            }
        }
    }

    impl FrequencyEngine for MockEngine {
        fn init(&mut self, _settings: Rc<RefCell<Settings>>) -> Result<()> {
            self.state.borrow_mut().init_calls += 1;
            Ok(())
        }

        fn apply_profile(&mut self, id: &ProfileRef, save: bool) -> Result<()> {
            self.state.borrow_mut().applied.push((id.clone(), save));
            Ok(())
        }

        fn default_profile(&self) -> Profile {
            Self::named("default", "Default")
        }

        fn battery_profile(&self) -> Profile {
            Self::named("battery", "Battery")
        }

        fn balanced_profile(&self) -> Profile {
            Self::named("balanced", "Balanced")
        }

        fn performance_profile(&self) -> Profile {
            Self::named("performance", "Performance")
        }
    }
}
