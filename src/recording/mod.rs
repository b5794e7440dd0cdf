// src/recording/mod.rs
//! Recording sessions: one start→stop capture per voice entry.
//!
//! `Idle → Recording → (Stopped | Aborted) → Idle`. A manager never holds
//! more than one capture, and dropping it mid-recording discards the capture.

mod cpal_capture;

pub use cpal_capture::CpalCapture;

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::entry::AudioRef;
use crate::error::RecordingError;

/// A live capture owned by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHandle {
    id: u64,
    path: PathBuf,
}

impl CaptureHandle {
    pub fn new(id: u64, path: PathBuf) -> Self {
        Self { id, path }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// File the capture is being written to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Microphone-side operations a recording session needs.
pub trait CaptureDevice {
    /// Fails with `PermissionDenied` when microphone access is refused.
    fn ensure_permission(&mut self) -> Result<(), RecordingError>;

    fn begin(&mut self) -> Result<CaptureHandle, RecordingError>;

    /// Stops `handle` and returns the finished media file.
    fn finish(&mut self, handle: &CaptureHandle) -> Result<AudioRef, RecordingError>;

    /// Stops `handle`, releases it and throws the partial file away.
    fn discard(&mut self, handle: &CaptureHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Recording,
    Stopped,
    Aborted,
}

#[derive(Debug)]
enum SessionState {
    Idle,
    Recording(CaptureHandle),
    Stopped(AudioRef),
    Aborted,
}

pub struct RecordingSessionManager<D: CaptureDevice> {
    device: D,
    state: SessionState,
}

impl<D: CaptureDevice> RecordingSessionManager<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            state: SessionState::Idle,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Recording(_) => SessionPhase::Recording,
            SessionState::Stopped(_) => SessionPhase::Stopped,
            SessionState::Aborted => SessionPhase::Aborted,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording(_))
    }

    pub fn handle(&self) -> Option<&CaptureHandle> {
        match &self.state {
            SessionState::Recording(handle) => Some(handle),
            _ => None,
        }
    }

    /// Media produced by the last `stop()`, until the next `reset()`/`start()`.
    pub fn last_recording(&self) -> Option<&AudioRef> {
        match &self.state {
            SessionState::Stopped(audio) => Some(audio),
            _ => None,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Begins capturing. While already recording this returns the live
    /// handle instead of opening a second capture.
    pub fn start(&mut self) -> Result<CaptureHandle, RecordingError> {
        if let SessionState::Recording(handle) = &self.state {
            return Ok(handle.clone());
        }
        self.device.ensure_permission()?;
        let handle = self.device.begin()?;
        info!("Recording started ({})", handle.path().display());
        self.state = SessionState::Recording(handle.clone());
        Ok(handle)
    }

    /// Finalizes the capture. Outside `Recording` this does nothing and
    /// returns `None`.
    pub fn stop(&mut self) -> Result<Option<AudioRef>, RecordingError> {
        let handle = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Recording(handle) => handle,
            other => {
                self.state = other;
                return Ok(None);
            }
        };
        match self.device.finish(&handle) {
            Ok(audio) => {
                info!("Recording stopped: {audio}");
                self.state = SessionState::Stopped(audio.clone());
                Ok(Some(audio))
            }
            Err(err) => {
                warn!("Failed to finalize recording, discarding it: {err}");
                self.device.discard(&handle);
                self.state = SessionState::Aborted;
                Err(err)
            }
        }
    }

    /// Force-stops a live capture. Returns whether one was running.
    pub fn abort(&mut self) -> bool {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Recording(handle) => {
                self.device.discard(&handle);
                self.state = SessionState::Aborted;
                info!("Recording aborted");
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    /// Returns a stopped or aborted session to `Idle`.
    pub fn reset(&mut self) {
        if !self.is_recording() {
            self.state = SessionState::Idle;
        }
    }
}

impl<D: CaptureDevice> Drop for RecordingSessionManager<D> {
    fn drop(&mut self) {
        if let SessionState::Recording(handle) = &self.state {
            warn!("Recording session dropped while capturing; discarding");
            self.device.discard(handle);
        }
    }
}
