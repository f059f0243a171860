// src/options.rs

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(name = "cpufreq-manager")]
#[command(about = "CPU frequency profile manager for Linux", long_about = None)]
pub struct Args {
    /// Enable debugging messages
    #[arg(long)]
    pub debug: bool,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    /// Enable extension mode
    #[arg(long)]
    pub extension: bool,

    /// Do not remember applied profile
    #[arg(long = "no-save")]
    pub no_save: bool,

    /// Apply power profile battery|balanced|performance|system|user|GUID
    #[arg(long, value_name = "GUID", num_args = 0..=1, default_missing_value = "")]
    pub profile: Option<String>,

    /// Use config file at defined path
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,
}

/// Normalized invocation intent, produced once per process launch and
/// read-only thereafter. Secondary instances serialize it unchanged over the
/// forwarding socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationIntent {
    /// 0 = warnings only, 1 = verbose, 2 = debug. `--debug` supersedes
    /// `--verbose`.
    pub verbosity: u8,
    pub extension: bool,
    /// Remember the applied profile unless `--no-save` was given.
    pub save: bool,
    /// Profile keyword or GUID from `--profile`. `Some("")` when the flag was
    /// given without a value.
    pub profile: Option<String>,
}

/// What the caller should do once local options are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Continue with normal activation.
    Continue,
    /// A profile was requested on the command line: apply it headless, never
    /// open a window, exit when the change completes.
    ApplyProfile,
}

impl InvocationIntent {
    pub fn from_args(args: &Args) -> Self {
        let verbosity = if args.debug {
            2
        } else if args.verbose {
            1
        } else {
            0
        };

        Self {
            verbosity,
            extension: args.extension,
            save: !args.no_save,
            profile: args.profile.clone(),
        }
    }

    pub fn dispatch(&self) -> Dispatch {
        if self.profile.is_some() {
            Dispatch::ApplyProfile
        } else {
            Dispatch::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent_from(argv: &[&str]) -> InvocationIntent {
        let args = Args::try_parse_from(argv).unwrap();
        InvocationIntent::from_args(&args)
    }

    #[test]
    fn test_defaults() {
        let intent = intent_from(&["cpufreq-manager"]);
        assert_eq!(intent.verbosity, 0);
        assert!(!intent.extension);
        assert!(intent.save);
        assert_eq!(intent.profile, None);
        assert_eq!(intent.dispatch(), Dispatch::Continue);
    }

    #[test]
    fn test_debug_supersedes_verbose() {
        let intent = intent_from(&["cpufreq-manager", "--verbose", "--debug"]);
        assert_eq!(intent.verbosity, 2);

        let intent = intent_from(&["cpufreq-manager", "--verbose"]);
        assert_eq!(intent.verbosity, 1);
    }

    #[test]
    fn test_no_save() {
        let intent = intent_from(&["cpufreq-manager", "--no-save"]);
        assert!(!intent.save);
    }

    #[test]
    fn test_profile_value() {
        let intent = intent_from(&["cpufreq-manager", "--profile=balanced"]);
        assert_eq!(intent.profile.as_deref(), Some("balanced"));
        assert_eq!(intent.dispatch(), Dispatch::ApplyProfile);
    }

    #[test]
    fn test_profile_without_value() {
        // the flag alone still signals terminal intent; the empty value is
        // rejected later, before any engine call
        let intent = intent_from(&["cpufreq-manager", "--profile"]);
        assert_eq!(intent.profile.as_deref(), Some(""));
        assert_eq!(intent.dispatch(), Dispatch::ApplyProfile);
    }

    #[test]
    fn test_intent_round_trips_over_the_wire() {
        let intent = intent_from(&["cpufreq-manager", "--extension", "--profile=performance"]);
        let json = serde_json::to_string(&intent).unwrap();
        let back: InvocationIntent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, intent);
    }
}
