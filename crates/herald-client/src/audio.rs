//! Single-clip playback for a subscriber.

use std::process::Stdio;

use herald_core::PlaybackError;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Where clips actually play. `start` replaces whatever the sink is playing.
pub trait AudioSink: Send {
    fn start(&mut self, reference: &str) -> Result<(), PlaybackError>;
    fn stop(&mut self);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    /// No explicit interaction yet, request dropped.
    Locked,
    Started(String),
    Failed(PlaybackError),
}

/// Owns the one playback resource. Plays are best-effort: failures are
/// logged and never retried.
pub struct AudioCoordinator {
    sink: Box<dyn AudioSink>,
    unlocked: bool,
    active: Option<String>,
}

impl AudioCoordinator {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            unlocked: false,
            active: None,
        }
    }

    /// Record the first explicit interaction. Earlier plays are not replayed.
    pub fn unlock(&mut self) {
        if !self.unlocked {
            debug!("audio unlocked");
        }
        self.unlocked = true;
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn play(&mut self, reference: &str) -> PlayOutcome {
        if !self.unlocked {
            debug!(reference, "audio locked, dropping play request");
            return PlayOutcome::Locked;
        }
        if self.active.take().is_some() {
            self.sink.stop();
        }
        match self.sink.start(reference) {
            Ok(()) => {
                self.active = Some(reference.to_owned());
                PlayOutcome::Started(reference.to_owned())
            }
            Err(err) => {
                warn!(reference, error = %err, "audio playback failed");
                PlayOutcome::Failed(err)
            }
        }
    }

    /// Operator asked for this clip. The request itself counts as the
    /// unlocking interaction.
    pub fn play_requested(&mut self, reference: &str) -> PlayOutcome {
        self.unlock();
        self.play(reference)
    }

    pub fn stop(&mut self) {
        if self.active.take().is_some() {
            self.sink.stop();
        }
    }
}

impl std::fmt::Debug for AudioCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCoordinator")
            .field("unlocked", &self.unlocked)
            .field("active", &self.active)
            .finish()
    }
}

/// Plays clips by running an external player (`mpv`, `afplay`, ...) with the
/// resolved clip URL as its last argument.
pub struct CommandSink {
    program: String,
    args: Vec<String>,
    base_url: String,
    child: Option<Child>,
}

impl CommandSink {
    /// `player` is split on whitespace: program first, then fixed arguments.
    /// Relative references are resolved against `base_url`.
    pub fn new(player: &str, base_url: impl Into<String>) -> Option<Self> {
        let mut parts = player.split_whitespace().map(str::to_owned);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            base_url: base_url.into(),
            child: None,
        })
    }

    pub fn is_playing(&self) -> bool {
        self.child.is_some()
    }

    pub fn resolve(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_owned()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                reference.trim_start_matches('/')
            )
        }
    }
}

impl AudioSink for CommandSink {
    /// Must run inside a Tokio runtime.
    fn start(&mut self, reference: &str) -> Result<(), PlaybackError> {
        self.stop();
        let url = self.resolve(reference);
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Failed {
                reference: url.clone(),
                reason: e.to_string(),
            })?;
        debug!(program = %self.program, url, pid = ?child.id(), "player started");
        self.child = Some(child);
        Ok(())
    }

    /// Signals the player and returns; the exit is collected off the loop.
    fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = child.id();
        if let Err(e) = child.start_kill() {
            warn!(?pid, error = %e, "failed to stop player");
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let _ = handle.spawn(async move {
                    match child.wait().await {
                        Ok(status) => debug!(?pid, %status, "player exited"),
                        Err(e) => warn!(?pid, error = %e, "failed to reap player"),
                    }
                });
            }
            // Dropping with kill_on_drop leaves reaping to Tokio.
            Err(_) => drop(child),
        }
    }
}

impl Drop for CommandSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sink used when no player is configured.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn start(&mut self, _reference: &str) -> Result<(), PlaybackError> {
        Err(PlaybackError::Unavailable("no audio player configured".into()))
    }

    fn stop(&mut self) {}
}

#[cfg(any(test, feature = "testing"))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkCall {
    Start(String),
    Stop,
}

/// Records calls instead of playing. Clones share the same log.
#[cfg(any(test, feature = "testing"))]
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    calls: std::sync::Arc<parking_lot::Mutex<Vec<SinkCall>>>,
    fail: bool,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every `start` fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn starts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                SinkCall::Start(r) => Some(r.clone()),
                SinkCall::Stop => None,
            })
            .collect()
    }
}

#[cfg(any(test, feature = "testing"))]
impl AudioSink for RecordingSink {
    fn start(&mut self, reference: &str) -> Result<(), PlaybackError> {
        self.calls.lock().push(SinkCall::Start(reference.to_owned()));
        if self.fail {
            return Err(PlaybackError::Failed {
                reference: reference.to_owned(),
                reason: "device busy".into(),
            });
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.lock().push(SinkCall::Stop);
    }
}
