// src/recording/cpal_capture.rs
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, DefaultStreamConfigError, Device, SampleFormat, StreamConfig};
use hound::{WavSpec, WavWriter};
use log::{info, warn};
use uuid::Uuid;

use super::{CaptureDevice, CaptureHandle};
use crate::entry::AudioRef;
use crate::error::RecordingError;

type SharedWriter = Arc<Mutex<Option<WavWriter<BufWriter<File>>>>>;

struct ActiveCapture {
    handle: CaptureHandle,
    stream: cpal::Stream,
    writer: SharedWriter,
}

/// Default-microphone capture into 16-bit WAV files.
pub struct CpalCapture {
    audio_dir: PathBuf,
    next_id: u64,
    active: Option<ActiveCapture>,
}

impl CpalCapture {
    pub fn new(audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            next_id: 1,
            active: None,
        }
    }

    fn input_device() -> Result<Device, RecordingError> {
        cpal::default_host()
            .default_input_device()
            .ok_or(RecordingError::NoInputDevice)
    }

    /// Drops the stream first so the callback can no longer touch the writer.
    fn release(active: ActiveCapture) -> Option<WavWriter<BufWriter<File>>> {
        drop(active.stream);
        let mut guard = active.writer.lock().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

fn write_samples(writer: &SharedWriter, samples: impl Iterator<Item = i16>) {
    let mut guard = writer.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(writer) = guard.as_mut() {
        for sample in samples {
            if writer.write_sample(sample).is_err() {
                break;
            }
        }
    }
}

fn map_build_error(err: BuildStreamError) -> RecordingError {
    match err {
        BuildStreamError::DeviceNotAvailable => RecordingError::NoInputDevice,
        other => RecordingError::Capture(other.to_string()),
    }
}

/// Builds the input stream feeding `writer` and starts it.
fn start_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    writer: &SharedWriter,
) -> Result<cpal::Stream, RecordingError> {
    let err_fn = |err| warn!("Audio input stream error: {err}");
    let sink = Arc::clone(writer);
    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                write_samples(&sink, data.iter().copied().map(f32_to_i16));
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                write_samples(&sink, data.iter().copied());
            },
            err_fn,
            None,
        ),
        other => {
            return Err(RecordingError::Capture(format!(
                "unsupported sample format {other:?}"
            )))
        }
    }
    .map_err(map_build_error)?;

    stream
        .play()
        .map_err(|err| RecordingError::Capture(err.to_string()))?;
    Ok(stream)
}

/// Creates the WAV file at `path` and runs `start` against its writer. If
/// either step fails the file is gone again when this returns.
fn with_capture_file<T>(
    path: &Path,
    spec: WavSpec,
    start: impl FnOnce(&SharedWriter) -> Result<T, RecordingError>,
) -> Result<(SharedWriter, T), RecordingError> {
    let writer = match WavWriter::create(path, spec) {
        Ok(writer) => writer,
        Err(err) => {
            remove_partial(path);
            return Err(RecordingError::Capture(err.to_string()));
        }
    };
    let writer: SharedWriter = Arc::new(Mutex::new(Some(writer)));
    match start(&writer) {
        Ok(started) => Ok((writer, started)),
        Err(err) => {
            drop(writer);
            remove_partial(path);
            Err(err)
        }
    }
}

/// Deletes a capture file that never became a recording.
fn remove_partial(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {err}", path.display());
        }
    }
}

impl CaptureDevice for CpalCapture {
    fn ensure_permission(&mut self) -> Result<(), RecordingError> {
        let device = Self::input_device()?;
        // Hosts that gate the microphone refuse to describe the input config
        // until access is granted.
        device.default_input_config().map_err(|err| match err {
            DefaultStreamConfigError::DeviceNotAvailable => RecordingError::NoInputDevice,
            other => {
                warn!("Microphone unavailable: {other}");
                RecordingError::PermissionDenied
            }
        })?;
        Ok(())
    }

    fn begin(&mut self) -> Result<CaptureHandle, RecordingError> {
        if let Some(active) = &self.active {
            return Ok(active.handle.clone());
        }

        std::fs::create_dir_all(&self.audio_dir)?;
        let device = Self::input_device()?;
        let supported = device
            .default_input_config()
            .map_err(|err| RecordingError::Capture(err.to_string()))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        if let Ok(name) = device.name() {
            info!("Using audio input {name} ({config:?})");
        }

        let path = self
            .audio_dir
            .join(format!("recording-{}.wav", Uuid::new_v4()));
        let spec = WavSpec {
            channels: config.channels,
            sample_rate: config.sample_rate.0,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let (writer, stream) = with_capture_file(&path, spec, |writer| {
            start_stream(&device, &config, sample_format, writer)
        })?;

        let handle = CaptureHandle::new(self.next_id, path);
        self.next_id += 1;
        self.active = Some(ActiveCapture {
            handle: handle.clone(),
            stream,
            writer,
        });
        Ok(handle)
    }

    fn finish(&mut self, handle: &CaptureHandle) -> Result<AudioRef, RecordingError> {
        let active = match self.active.take() {
            Some(active) if active.handle == *handle => active,
            other => {
                self.active = other;
                return Err(RecordingError::Capture(format!(
                    "capture {} is not active",
                    handle.id()
                )));
            }
        };

        let writer = Self::release(active)
            .ok_or_else(|| RecordingError::Capture("capture writer already closed".into()))?;
        writer
            .finalize()
            .map_err(|err| RecordingError::Capture(err.to_string()))?;
        Ok(AudioRef::from_path(handle.path()))
    }

    fn discard(&mut self, handle: &CaptureHandle) {
        match self.active.take() {
            Some(active) if active.handle == *handle => {
                drop(Self::release(active));
            }
            other => self.active = other,
        }
        remove_partial(handle.path());
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let path = active.handle.path().to_path_buf();
            drop(Self::release(active));
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_float_samples_with_clamping() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(4.0), i16::MAX);
        assert_eq!(f32_to_i16(-4.0), -i16::MAX);
    }

    #[test]
    fn writes_samples_until_the_writer_is_taken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer: SharedWriter =
            Arc::new(Mutex::new(Some(WavWriter::create(&path, spec).unwrap())));

        write_samples(&writer, [1_i16, 2, 3].into_iter());
        let taken = writer.lock().unwrap().take().unwrap();
        taken.finalize().unwrap();
        write_samples(&writer, [4_i16].into_iter());

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 3);
    }

    fn mono_spec() -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[test]
    fn failed_stream_start_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording-failed.wav");

        let result = with_capture_file(&path, mono_spec(), |_| {
            Err::<(), _>(RecordingError::Capture("device vanished".into()))
        });

        assert!(matches!(result, Err(RecordingError::Capture(_))));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn started_capture_keeps_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording-ok.wav");

        let (writer, started) = with_capture_file(&path, mono_spec(), |_| Ok(7)).unwrap();

        assert_eq!(started, 7);
        assert!(path.exists());
        let writer = writer.lock().unwrap().take().unwrap();
        writer.finalize().unwrap();
    }

    #[test]
    fn unwritable_location_reports_a_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("recording.wav");

        let result = with_capture_file(&path, mono_spec(), |_| Ok(()));

        assert!(matches!(result, Err(RecordingError::Capture(_))));
        assert!(!path.exists());
    }
}
