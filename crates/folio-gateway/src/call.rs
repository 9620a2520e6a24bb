//! Simulated one-to-one calls.
//!
//! There is no signaling and no remote media path. A call is a local state
//! machine with a ticking duration counter and, for video, a best-effort
//! local capture handle used for the self-preview.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Active(CallKind),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("A call is already in progress")]
    AlreadyActive,
}

/// Opens local capture devices.
pub trait MediaSource: Send + Sync {
    fn open(&self) -> anyhow::Result<CaptureHandle>;
}

/// Media source for hosts without capture devices. Always fails.
pub struct NoMedia;

impl MediaSource for NoMedia {
    fn open(&self) -> anyhow::Result<CaptureHandle> {
        Err(anyhow::anyhow!("no capture devices available"))
    }
}

/// An open local camera/microphone pair. Released on drop.
pub struct CaptureHandle {
    label: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CaptureHandle {
    pub fn new(label: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: label.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle").field("label", &self.label).finish()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// What the call UI renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    pub state: CallState,
    pub muted: bool,
    pub video_enabled: bool,
    pub duration_secs: u64,
    pub has_local_preview: bool,
}

pub struct CallSimulator {
    peer_name: String,
    media: Arc<dyn MediaSource>,
    on_end: Box<dyn FnMut() + Send>,
    state: CallState,
    muted: bool,
    video_enabled: bool,
    elapsed: Arc<AtomicU64>,
    ticker: Option<JoinHandle<()>>,
    capture: Option<CaptureHandle>,
}

impl CallSimulator {
    /// `on_end` runs once each time an active call ends.
    pub fn new(
        peer_name: impl Into<String>,
        media: Arc<dyn MediaSource>,
        on_end: impl FnMut() + Send + 'static,
    ) -> Self {
        Self {
            peer_name: peer_name.into(),
            media,
            on_end: Box::new(on_end),
            state: CallState::Idle,
            muted: false,
            video_enabled: true,
            elapsed: Arc::new(AtomicU64::new(0)),
            ticker: None,
            capture: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, CallState::Active(_))
    }

    pub fn duration_secs(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            state: self.state,
            muted: self.muted,
            video_enabled: self.video_enabled,
            duration_secs: self.duration_secs(),
            has_local_preview: self.capture.is_some(),
        }
    }

    /// Idle -> Active. For video, tries to open local capture; failing that,
    /// the call carries on without a preview.
    pub async fn start_call(&mut self, kind: CallKind) -> Result<(), CallError> {
        if self.is_active() {
            return Err(CallError::AlreadyActive);
        }

        self.state = CallState::Active(kind);
        self.elapsed.store(0, Ordering::Relaxed);
        self.ticker = Some(spawn_ticker(self.elapsed.clone()));
        info!("{:?} call with {} started", kind, self.peer_name);

        if kind == CallKind::Video {
            let media = self.media.clone();
            match tokio::task::spawn_blocking(move || media.open()).await {
                Ok(Ok(handle)) => {
                    info!("Local preview from {}", handle.label());
                    self.capture = Some(handle);
                }
                Ok(Err(e)) => warn!("Error accessing media devices: {}", e),
                Err(e) => warn!("Media open task failed: {}", e),
            }
        }

        Ok(())
    }

    /// Active -> Idle. Stops the counter, releases capture and fires `on_end`.
    /// Does nothing when no call is active.
    pub fn end_call(&mut self) {
        if !self.is_active() {
            return;
        }

        self.stop_media();
        info!(
            "Call with {} ended after {}",
            self.peer_name,
            format_duration(self.duration_secs())
        );
        self.state = CallState::Idle;
        self.elapsed.store(0, Ordering::Relaxed);
        (self.on_end)();
    }

    /// Local flag only; there is no outgoing audio to mute.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    /// Local flag only; the preview handle stays open.
    pub fn toggle_video(&mut self) -> bool {
        self.video_enabled = !self.video_enabled;
        self.video_enabled
    }

    fn stop_media(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.capture = None;
    }
}

impl Drop for CallSimulator {
    fn drop(&mut self) {
        self.stop_media();
    }
}

fn spawn_ticker(elapsed: Arc<AtomicU64>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        interval.tick().await;
        loop {
            interval.tick().await;
            elapsed.fetch_add(1, Ordering::Relaxed);
        }
    })
}

/// `MM:SS`, minutes unbounded.
pub fn format_duration(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
