// src/instance.rs

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

use crate::mainloop::{Event, EventSender};
use crate::options::InvocationIntent;

const SOCKET_NAME: &str = "cpufreq-manager.sock";

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("failed to register instance identity: {0}")]
    Registration(#[source] io::Error),
    #[error("failed to forward intent to the primary instance: {0}")]
    Forward(#[source] io::Error),
}

/// Outcome of the atomic register-or-detect-existing step.
pub enum Registration {
    /// Nobody held the shared identity; this process is now primary.
    Primary(InstanceListener),
    /// Another process is primary; forward the intent to it and exit.
    Secondary(InstanceClient),
}

fn socket_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(SOCKET_NAME)
}

pub fn register() -> Result<Registration, InstanceError> {
    register_at(socket_path())
}

pub fn register_at(path: PathBuf) -> Result<Registration, InstanceError> {
    match UnixListener::bind(&path) {
        Ok(listener) => Ok(Registration::Primary(InstanceListener { listener, path })),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            match UnixStream::connect(&path) {
                Ok(stream) => Ok(Registration::Secondary(InstanceClient { stream })),
                Err(_) => {
                    // stale socket left behind by a crashed primary
                    debug!("removing stale socket {}", path.display());
                    fs::remove_file(&path).map_err(InstanceError::Registration)?;
                    let listener =
                        UnixListener::bind(&path).map_err(InstanceError::Registration)?;
                    Ok(Registration::Primary(InstanceListener { listener, path }))
                }
            }
        }
        Err(e) => Err(InstanceError::Registration(e)),
    }
}

/// Held by the primary instance; accepts forwarded activations and posts
/// them into the event loop, one intent per connection.
pub struct InstanceListener {
    listener: UnixListener,
    path: PathBuf,
}

impl InstanceListener {
    pub fn spawn(self, events: EventSender) {
        thread::spawn(move || {
            for stream in self.listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Some(intent) = read_intent(stream) {
                            debug!("forwarded activation received");
                            if events.send(Event::Activate(intent)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("instance socket accept failed: {}", e);
                        break;
                    }
                }
            }
            let _ = fs::remove_file(&self.path);
        });
    }
}

fn read_intent(stream: UnixStream) -> Option<InvocationIntent> {
    let mut line = String::new();
    match BufReader::new(stream).read_line(&mut line) {
        // a probe connection that sends nothing is not an activation
        Ok(0) => None,
        Ok(_) => match serde_json::from_str(line.trim()) {
            Ok(intent) => Some(intent),
            Err(e) => {
                warn!("malformed forwarded intent: {}", e);
                None
            }
        },
        Err(e) => {
            warn!("failed to read forwarded intent: {}", e);
            None
        }
    }
}

/// Held by a secondary instance; its only job is to hand the invocation
/// intent to the primary.
pub struct InstanceClient {
    stream: UnixStream,
}

impl InstanceClient {
    pub fn forward(mut self, intent: &InvocationIntent) -> Result<(), InstanceError> {
        let json = serde_json::to_string(intent)
            .map_err(|e| InstanceError::Forward(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        writeln!(self.stream, "{}", json).map_err(InstanceError::Forward)?;
        self.stream.flush().map_err(InstanceError::Forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::time::Duration;
    use tempfile::tempdir;

    fn intent() -> InvocationIntent {
        InvocationIntent {
            verbosity: 1,
            extension: false,
            save: false,
            profile: Some("battery".to_string()),
        }
    }

    #[test]
    fn test_first_registration_is_primary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.sock");

        match register_at(path).unwrap() {
            Registration::Primary(_) => {}
            Registration::Secondary(_) => panic!("expected primary"),
        }
    }

    #[test]
    fn test_second_registration_forwards_to_primary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.sock");

        let listener = match register_at(path.clone()).unwrap() {
            Registration::Primary(listener) => listener,
            Registration::Secondary(_) => panic!("expected primary"),
        };

        let (tx, rx) = unbounded();
        listener.spawn(tx);

        let client = match register_at(path).unwrap() {
            Registration::Secondary(client) => client,
            Registration::Primary(_) => panic!("expected secondary"),
        };
        client.forward(&intent()).unwrap();

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Event::Activate(received) => assert_eq!(received, intent()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_stale_socket_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.sock");

        {
            // bind and drop without cleanup: the file stays behind
            let _stale = UnixListener::bind(&path).unwrap();
        }
        assert!(path.exists());

        match register_at(path).unwrap() {
            Registration::Primary(_) => {}
            Registration::Secondary(_) => panic!("expected primary after reclaiming stale socket"),
        }
    }
}
