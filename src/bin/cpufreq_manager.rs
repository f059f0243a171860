// src/bin/cpufreq_manager.rs

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error};

use cpufreq_manager::app::{Manager, SurfaceFactory};
use cpufreq_manager::config::{find_config_file, CONFIG};
use cpufreq_manager::engine::SysfsEngine;
use cpufreq_manager::instance::{self, Registration};
use cpufreq_manager::logging;
use cpufreq_manager::mainloop::{Event, MainLoop};
use cpufreq_manager::options::{Args, Dispatch, InvocationIntent};
use cpufreq_manager::settings::Settings;
use cpufreq_manager::surface::{PresentationSurface, TextSurface};

fn main() -> ExitCode {
    let args = Args::parse();
    let intent = InvocationIntent::from_args(&args);
    logging::init(intent.verbosity);

    let config_path = find_config_file(args.config.as_deref());
    if let Err(e) = CONFIG.set_path(config_path) {
        error!("failed to load config file: {:#}", e);
    }

    let registration = match instance::register() {
        Ok(registration) => registration,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match (intent.dispatch(), registration) {
        // `--profile` never proceeds to window activation: this process
        // applies headless and exits, whichever instance is primary.
        (Dispatch::ApplyProfile, Registration::Primary(listener)) => {
            run_instance(intent, Some(listener))
        }
        (Dispatch::ApplyProfile, Registration::Secondary(_)) => run_instance(intent, None),
        (Dispatch::Continue, Registration::Primary(listener)) => {
            run_instance(intent, Some(listener))
        }
        (Dispatch::Continue, Registration::Secondary(client)) => {
            debug!("another instance is primary, forwarding intent");
            match client.forward(&intent) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("{}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run_instance(
    intent: InvocationIntent,
    listener: Option<instance::InstanceListener>,
) -> ExitCode {
    let mainloop = MainLoop::new();
    let handle = mainloop.handle();
    if let Some(listener) = listener {
        listener.spawn(handle.sender());
    }

    let settings = match Settings::load_default() {
        Ok(settings) => settings,
        Err(e) => {
            error!("failed to load settings: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = Box::new(SysfsEngine::new(handle.sender()));

    let surface_events = handle.sender();
    let factory: SurfaceFactory = Box::new(move || {
        Ok(Box::new(TextSurface::new(surface_events.clone())) as Box<dyn PresentationSurface>)
    });

    let mut manager = Manager::new(intent.clone(), handle.clone(), settings, engine, factory);

    match intent.dispatch() {
        Dispatch::ApplyProfile => {
            if let Err(e) = manager.process_profile() {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
            debug!(
                "finishing loading profile: `{}`",
                intent.profile.as_deref().unwrap_or("")
            );
        }
        Dispatch::Continue => handle.post(Event::Activate(intent)),
    }

    mainloop.run(|event| manager.on_event(event));
    ExitCode::SUCCESS
}
