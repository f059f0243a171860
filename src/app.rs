// src/app.rs

use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::engine::FrequencyEngine;
use crate::mainloop::{Event, Lease, LoopHandle};
use crate::options::InvocationIntent;
use crate::profile::{Profile, ProfileRef, SYSTEM_SETTINGS_LABEL};
use crate::settings::Settings;
use crate::surface::PresentationSurface;

/// Delay before a forwarded activation refreshes the panel label. A profile
/// application started by the forwarding instance may still be in flight;
/// the delay gives it a chance to finish first.
pub const REFRESH_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("no profile GUID specified")]
    MissingProfileId,
    #[error("presentation surface failed to construct: {0}")]
    Presentation(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Lifecycle phase of this process instance. A secondary instance never
/// builds a [`Manager`] at all: it forwards its intent and exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    PrimaryWithSurface,
    PrimaryHeadless,
}

/// Single-subscriber slot for engine change notifications. Registering a new
/// subscriber replaces the previous one: only the currently relevant
/// observer receives updates.
enum Subscriber {
    /// Refresh the visible control panel with the applied profile's name.
    PanelRefresh,
    /// One-shot: release the keep-alive lease so the process can exit.
    ReleaseHold(Option<Lease>),
}

pub type SurfaceFactory = Box<dyn FnMut() -> Result<Box<dyn PresentationSurface>, AppError>>;

/// The instance controller: decides this process's role on each activation,
/// runs the headless profile-application state machine, and relays change
/// notifications to the surface while one is visible.
pub struct Manager {
    intent: InvocationIntent,
    handle: LoopHandle,
    settings: Rc<RefCell<Settings>>,
    engine: Box<dyn FrequencyEngine>,
    surface_factory: SurfaceFactory,
    surface: Option<Box<dyn PresentationSurface>>,
    surface_lease: Option<Lease>,
    subscriber: Option<Subscriber>,
    settings_loaded: bool,
    finishing: bool,
    pub(crate) refresh_delay: Duration,
}

impl Manager {
    pub fn new(
        intent: InvocationIntent,
        handle: LoopHandle,
        settings: Settings,
        engine: Box<dyn FrequencyEngine>,
        surface_factory: SurfaceFactory,
    ) -> Self {
        Self {
            intent,
            handle,
            settings: Rc::new(RefCell::new(settings)),
            engine,
            surface_factory,
            surface: None,
            surface_lease: None,
            subscriber: None,
            settings_loaded: false,
            finishing: false,
            refresh_delay: REFRESH_DELAY,
        }
    }

    pub fn on_event(&mut self, event: Event) {
        match event {
            Event::Activate(intent) => {
                if let Err(e) = self.activate(&intent) {
                    error!("activation failed: {}", e);
                    self.handle.quit();
                }
            }
            Event::ProfileChanged(profile) => self.on_profile_changed(&profile),
            Event::RefreshPanel => self.refresh_panel(),
            Event::SurfaceClosed => {
                debug!("surface closed");
                self.surface = None;
                self.surface_lease = None;
            }
            Event::Quit => self.handle.quit(),
        }
    }

    /// Bind settings and engine together. Idempotent: a second call is a
    /// no-op and must not create a second engine/settings binding.
    pub fn initialize(&mut self) -> Result<()> {
        if self.settings_loaded {
            return Ok(());
        }
        self.engine.init(Rc::clone(&self.settings))?;
        self.settings_loaded = true;
        Ok(())
    }

    /// One activation event: the initial one, or one forwarded from a
    /// secondary instance.
    pub fn activate(&mut self, intent: &InvocationIntent) -> Result<(), AppError> {
        if self.finishing {
            debug!("activation ignored: headless apply in progress");
            return Ok(());
        }

        if self.surface.is_none() {
            self.initialize()?;

            let mut surface = (self.surface_factory)()?;
            surface.show();
            self.subscriber = Some(Subscriber::PanelRefresh);
            self.surface_lease = Some(self.handle.hold());

            if self.settings.borrow().save() {
                self.restore_saved();
            }

            if !surface.has_panel() {
                // non-recoverable UI failure: no partial window stays up
                self.surface_lease = None;
                self.handle.quit();
                return Err(AppError::Presentation("control panel missing".to_string()));
            }
            if let Err(e) = surface.panel_post_init() {
                self.surface_lease = None;
                self.handle.quit();
                return Err(AppError::Presentation(e.to_string()));
            }

            self.surface = Some(surface);
        } else {
            if intent.extension {
                debug!("extension re-activation, quitting");
                self.handle.quit();
                return Ok(());
            }
            if self.surface.as_ref().map_or(false, |s| s.has_panel()) {
                self.handle.schedule(self.refresh_delay, Event::RefreshPanel);
            }
        }

        if let Some(surface) = self.surface.as_mut() {
            surface.present();
        }
        Ok(())
    }

    /// Headless profile application, `Idle → Applying → Terminal`: the
    /// process holds a lease until the engine's completion notification
    /// releases it, then exits without ever showing a window.
    pub fn process_profile(&mut self) -> Result<(), AppError> {
        let id = match self.intent.profile.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                self.finishing = true;
                error!("no profile GUID specified");
                return Err(AppError::MissingProfileId);
            }
        };

        self.initialize()?;
        self.finishing = true;

        let lease = self.handle.hold();
        self.subscriber = Some(Subscriber::ReleaseHold(Some(lease)));

        self.engine
            .apply_profile(&ProfileRef::from(id.as_str()), self.intent.save)
            .map_err(AppError::Other)?;
        Ok(())
    }

    /// Engine completion relay. Fires for every completed change, no matter
    /// which instance or code path requested it.
    fn on_profile_changed(&mut self, profile: &Profile) {
        match self.subscriber.as_mut() {
            Some(Subscriber::PanelRefresh) => {
                if let Some(surface) = self.surface.as_mut() {
                    if surface.has_panel() {
                        surface.panel_update(&profile.name);
                    }
                }
            }
            Some(Subscriber::ReleaseHold(lease)) => {
                debug!("profile change complete: {}", profile.name);
                lease.take();
            }
            None => {}
        }
    }

    fn refresh_panel(&mut self) {
        if self.surface.as_ref().map_or(true, |s| !s.has_panel()) {
            return;
        }
        // another process may have applied and persisted a profile since
        if let Err(e) = self.settings.borrow_mut().reload() {
            warn!("could not reload settings: {:#}", e);
        }
        let label = self.current_profile_label();
        if let Some(surface) = self.surface.as_mut() {
            surface.panel_update(&label);
        }
    }

    /// First match wins: explicit GUID lookup in settings, then the
    /// well-known keywords, then the user profile, then the fallback label.
    fn current_profile_label(&self) -> String {
        let settings = self.settings.borrow();
        let guid = settings.guid();

        if let Some(profile) = settings.get_profile(guid) {
            return profile.name.clone();
        }
        match guid {
            "default" => self.engine.default_profile().name,
            "battery" => self.engine.battery_profile().name,
            "balanced" => self.engine.balanced_profile().name,
            "performance" => self.engine.performance_profile().name,
            "user" => settings
                .user_profile()
                .map(|p| p.name.clone())
                .unwrap_or_else(|| SYSTEM_SETTINGS_LABEL.to_string()),
            _ => SYSTEM_SETTINGS_LABEL.to_string(),
        }
    }

    fn restore_saved(&mut self) {
        let guid = self.settings.borrow().guid().to_string();
        if guid.is_empty() {
            return;
        }
        debug!("restoring saved profile `{}`", guid);
        if let Err(e) = self.engine.apply_profile(&ProfileRef::from(guid.as_str()), false) {
            error!("failed to restore saved profile: {:#}", e);
        }
    }

    pub fn phase(&self) -> Phase {
        if self.finishing {
            Phase::PrimaryHeadless
        } else if self.surface.is_some() {
            Phase::PrimaryWithSurface
        } else {
            Phase::Uninitialized
        }
    }

    pub fn finishing(&self) -> bool {
        self.finishing
    }

    /// Whether a keep-alive lease is pending an engine completion.
    pub fn pending_hold(&self) -> bool {
        matches!(self.subscriber, Some(Subscriber::ReleaseHold(Some(_))))
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }
}
