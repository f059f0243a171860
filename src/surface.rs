// src/surface.rs

use anyhow::Result;
use std::io::{self, BufRead};
use std::thread;
use sysinfo::System;
use tracing::debug;

use crate::mainloop::{Event, EventSender};

/// Boundary to the visible window and its control panel. The manager only
/// ever talks to this trait; [`TextSurface`] is the shipped stand-in, a
/// toolkit front end would provide its own implementation.
pub trait PresentationSurface {
    fn show(&mut self);

    /// Bring the surface to the foreground.
    fn present(&mut self);

    fn has_panel(&self) -> bool;

    /// One-time panel setup after the surface is first shown.
    fn panel_post_init(&mut self) -> Result<()>;

    /// Push a new profile label to the panel.
    fn panel_update(&mut self, label: &str);
}

/// Minimal terminal control panel. Counts as closed when stdin reaches EOF
/// or the user types `q`; the watcher thread posts the event and exits.
pub struct TextSurface {
    label: String,
}

impl TextSurface {
    pub fn new(events: EventSender) -> Self {
        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(input) if input.trim() == "q" => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
            debug!("surface input closed");
            let _ = events.send(Event::SurfaceClosed);
        });

        Self {
            label: String::new(),
        }
    }
}

impl PresentationSurface for TextSurface {
    fn show(&mut self) {
        println!("\n{}\n", "-".repeat(28) + " cpufreq-manager " + &"-".repeat(28));
        println!("Type q + Enter to close.\n");
    }

    fn present(&mut self) {
        if !self.label.is_empty() {
            println!("Active profile: {}", self.label);
        }
    }

    fn has_panel(&self) -> bool {
        true
    }

    fn panel_post_init(&mut self) -> Result<()> {
        let mut sys = System::new_all();
        sys.refresh_cpu();

        if let Some(cpu) = sys.cpus().first() {
            println!("Processor: {}", cpu.brand());
            println!("Cores: {}", sys.cpus().len());
            println!("CPU frequency: {:.0} MHz\n", cpu.frequency());
        }

        Ok(())
    }

    fn panel_update(&mut self, label: &str) {
        self.label = label.to_string();
        println!("Active profile: {}", label);
    }
}


#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_mock_surface_records_updates() {
        let log = Rc::new(RefCell::new(SurfaceLog::default()));
        let mut surface = MockSurface::new(Rc::clone(&log));

        surface.show();
        surface.panel_update("Battery");
        surface.present();

        assert_eq!(log.borrow().shows, 1);
        assert_eq!(log.borrow().presents, 1);
        assert_eq!(log.borrow().updates, vec!["Battery"]);
    }
}
