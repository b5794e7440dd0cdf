// src/playback/mod.rs
//! Single-slot audio playback.
//!
//! At most one media file is loaded at a time. Starting another file first
//! unloads whatever was there.

mod rodio_player;

pub use rodio_player::RodioPlayer;

use log::debug;

use crate::entry::AudioRef;
use crate::error::PlaybackError;

/// Device-side playback of one loaded file.
pub trait AudioSession {
    fn load_and_play(&mut self, audio: &AudioRef) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn unload(&mut self);
    /// True once the loaded file has played to the end (or nothing is loaded).
    fn is_finished(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackChange {
    Started(AudioRef),
    Paused(AudioRef),
}

pub struct PlaybackSlot<P: AudioSession> {
    session: P,
    loaded: Option<AudioRef>,
    paused: bool,
}

impl<P: AudioSession> PlaybackSlot<P> {
    pub fn new(session: P) -> Self {
        Self {
            session,
            loaded: None,
            paused: false,
        }
    }

    pub fn session(&self) -> &P {
        &self.session
    }

    /// The file currently audible, if any.
    pub fn playing(&self) -> Option<&AudioRef> {
        self.loaded
            .as_ref()
            .filter(|_| !self.paused && !self.session.is_finished())
    }

    /// Pauses `audio` if it is the one playing, otherwise switches to it and
    /// plays it from the start.
    pub fn toggle(&mut self, audio: &AudioRef) -> Result<PlaybackChange, PlaybackError> {
        if self.playing() == Some(audio) {
            self.session.pause();
            self.paused = true;
            return Ok(PlaybackChange::Paused(audio.clone()));
        }
        self.play(audio)?;
        Ok(PlaybackChange::Started(audio.clone()))
    }

    pub fn play(&mut self, audio: &AudioRef) -> Result<(), PlaybackError> {
        self.stop();
        self.session.load_and_play(audio)?;
        debug!("Playing {audio}");
        self.loaded = Some(audio.clone());
        self.paused = false;
        Ok(())
    }

    /// Unloads whatever is loaded.
    pub fn stop(&mut self) {
        if let Some(previous) = self.loaded.take() {
            self.session.unload();
            debug!("Unloaded {previous}");
        }
        self.paused = false;
    }

    /// Unloads `audio` if it is the loaded file. Returns whether it was.
    pub fn stop_if_loaded(&mut self, audio: &AudioRef) -> bool {
        if self.loaded.as_ref() == Some(audio) {
            self.stop();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    #[derive(Debug, Default)]
    pub struct FakePlayer {
        pub loaded: Option<AudioRef>,
        pub playing: bool,
        pub unloads: usize,
        pub fail_next_load: bool,
    }

    impl AudioSession for FakePlayer {
        fn load_and_play(&mut self, audio: &AudioRef) -> Result<(), PlaybackError> {
            if std::mem::take(&mut self.fail_next_load) {
                return Err(PlaybackError::Decode("bad header".into()));
            }
            assert!(self.loaded.is_none(), "previous file was not unloaded");
            self.loaded = Some(audio.clone());
            self.playing = true;
            Ok(())
        }

        fn pause(&mut self) {
            self.playing = false;
        }

        fn unload(&mut self) {
            self.loaded = None;
            self.playing = false;
            self.unloads += 1;
        }

        fn is_finished(&self) -> bool {
            self.loaded.is_none()
        }
    }
}
