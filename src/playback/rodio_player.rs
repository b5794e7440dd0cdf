// src/playback/rodio_player.rs
use std::fs::File;
use std::io::BufReader;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use super::AudioSession;
use crate::entry::AudioRef;
use crate::error::PlaybackError;

/// Plays local audio files on the default output device. The device is
/// opened on first use.
#[derive(Default)]
pub struct RodioPlayer {
    output: Option<(OutputStream, OutputStreamHandle)>,
    sink: Option<Sink>,
}

impl RodioPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks the calling thread until the loaded file has played out.
    pub fn wait_until_finished(&self) {
        if let Some(sink) = &self.sink {
            sink.sleep_until_end();
        }
    }
}

impl AudioSession for RodioPlayer {
    fn load_and_play(&mut self, audio: &AudioRef) -> Result<(), PlaybackError> {
        let path = audio
            .local_path()
            .ok_or_else(|| PlaybackError::NotLocal(audio.to_string()))?;
        let file = File::open(&path).map_err(|source| PlaybackError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let source =
            Decoder::new(BufReader::new(file)).map_err(|err| PlaybackError::Decode(err.to_string()))?;

        let (_, handle) = match self.output.take() {
            Some(output) => self.output.insert(output),
            None => {
                let output = OutputStream::try_default()
                    .map_err(|err| PlaybackError::Output(err.to_string()))?;
                self.output.insert(output)
            }
        };
        let sink = Sink::try_new(handle).map_err(|err| PlaybackError::Output(err.to_string()))?;
        sink.append(source);
        sink.play();
        self.sink = Some(sink);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn unload(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn is_finished(&self) -> bool {
        self.sink.as_ref().map_or(true, Sink::empty)
    }
}
