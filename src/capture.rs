// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    error::Error,
    fmt, mem,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::{config, export::Clip};

pub mod cpal;
pub mod mock;
pub mod refine;

/// The sample type captured from the audio interface.
pub type Sample = i16;

/// Which side of a note's captured region a cue marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CueKind {
    On,
    Off,
}

impl fmt::Display for CueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CueKind::On => write!(f, "NoteOn"),
            CueKind::Off => write!(f, "NoteOff"),
        }
    }
}

/// A marker at a captured frame. The value is the MIDI note the cue belongs to, or
/// WHOLE_CAPTURE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioCue {
    pub frame: u64,
    pub kind: CueKind,
    pub value: i32,
}

impl AudioCue {
    /// Cue value used for spans that cover the whole capture rather than a single note.
    pub const WHOLE_CAPTURE: i32 = -1;
}

/// Storage shared between the buffer owner and the capture driver.
struct Shared {
    channels: u16,
    rate: u32,
    /// Only the writer takes this lock while capture is running.
    samples: Mutex<Vec<Sample>>,
    /// Published with Release after the samples are copied, read with Acquire by cues.
    frames_written: AtomicU64,
}

impl Shared {
    fn write(&self, frames: &[Sample]) -> usize {
        let channels = self.channels as usize;
        let mut samples = self.samples.lock();

        let written = self.frames_written.load(Ordering::Relaxed) as usize;
        let capacity = samples.len() / channels;
        let accepted = (frames.len() / channels).min(capacity.saturating_sub(written));
        if accepted == 0 {
            return 0;
        }

        let start = written * channels;
        let end = start + accepted * channels;
        samples[start..end].copy_from_slice(&frames[..accepted * channels]);
        self.frames_written
            .store((written + accepted) as u64, Ordering::Release);
        accepted
    }
}

/// The write capability given to capture drivers. It can't resize the buffer or record
/// cues, and owning one doesn't keep the recorder from finishing the capture.
#[derive(Clone)]
pub struct CaptureWriter {
    shared: Arc<Shared>,
}

impl CaptureWriter {
    /// Copies as many whole interleaved frames as fit. Returns the number of frames accepted,
    /// which is 0 once the buffer is full. Trailing partial frames are ignored.
    pub fn write(&self, frames: &[Sample]) -> usize {
        self.shared.write(frames)
    }

    pub fn channels(&self) -> u16 {
        self.shared.channels
    }

    pub fn rate(&self) -> u32 {
        self.shared.rate
    }

    pub fn frames_written(&self) -> u64 {
        self.shared.frames_written.load(Ordering::Acquire)
    }
}

/// A fixed capacity store of interleaved frames plus the cues recorded against it.
pub struct CaptureBuffer {
    shared: Arc<Shared>,
    cues: Vec<AudioCue>,
}

impl CaptureBuffer {
    /// Creates an empty buffer. It accepts no frames until it's resized.
    pub fn new(channels: u16, rate: u32) -> Result<CaptureBuffer, Box<dyn Error>> {
        if channels < 1 {
            return Err("invalid channel count".into());
        }
        if rate == 0 {
            return Err("sample rate must be greater than 0".into());
        }

        Ok(CaptureBuffer {
            shared: Arc::new(Shared {
                channels,
                rate,
                samples: Mutex::new(Vec::new()),
                frames_written: AtomicU64::new(0),
            }),
            cues: Vec::new(),
        })
    }

    /// Sets the capacity in frames. Call this before capture starts. Shrinking below the
    /// frames already written clamps the written count, which is how an aborted capture
    /// gives back its unused storage.
    pub fn resize(&mut self, capacity_frames: usize) {
        let mut samples = self.shared.samples.lock();
        let new_len = capacity_frames * self.shared.channels as usize;
        if new_len == samples.len() {
            return;
        }

        if (capacity_frames as u64) < self.shared.frames_written.load(Ordering::Acquire) {
            self.shared
                .frames_written
                .store(capacity_frames as u64, Ordering::Release);
        }
        samples.resize(new_len, 0);
        samples.shrink_to_fit();
    }

    /// Writes frames directly. See CaptureWriter::write.
    pub fn write(&self, frames: &[Sample]) -> usize {
        self.shared.write(frames)
    }

    /// Returns a write handle for a capture driver.
    pub fn writer(&self) -> CaptureWriter {
        CaptureWriter {
            shared: self.shared.clone(),
        }
    }

    /// Records a cue at the writer's current progress.
    pub fn cue(&mut self, kind: CueKind, value: i32) -> AudioCue {
        let cue = AudioCue {
            frame: self.shared.frames_written.load(Ordering::Acquire),
            kind,
            value,
        };
        self.cues.push(cue);
        cue
    }

    pub fn reserve_cues(&mut self, additional: usize) {
        self.cues.reserve(additional);
    }

    pub fn channels(&self) -> u16 {
        self.shared.channels
    }

    pub fn rate(&self) -> u32 {
        self.shared.rate
    }

    /// The number of frames written so far.
    pub fn total_frames(&self) -> u64 {
        self.shared.frames_written.load(Ordering::Acquire)
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.samples.lock().len() / self.shared.channels as usize
    }

    pub fn cues(&self) -> &[AudioCue] {
        &self.cues
    }

    /// Returns a copy of the written samples.
    pub fn samples(&self) -> Vec<Sample> {
        let end = self.total_frames() as usize * self.shared.channels as usize;
        self.shared.samples.lock()[..end].to_vec()
    }

    /// Tightens every cue to the first sample at or above the threshold. Only valid once
    /// capture has stopped.
    pub fn refine_cues(&mut self, threshold: u32) {
        let samples = self.shared.samples.lock();
        refine::refine(
            &samples,
            self.shared.channels,
            self.total_frames(),
            &mut self.cues,
            threshold,
        );
    }

    /// Freezes the buffer into an immutable capture. Capture must have stopped.
    pub fn into_capture(self) -> Capture {
        let total_frames = self.total_frames() as usize;
        let mut samples = mem::take(&mut *self.shared.samples.lock());
        samples.truncate(total_frames * self.shared.channels as usize);

        Capture {
            channels: self.shared.channels,
            rate: self.shared.rate,
            samples,
            cues: self.cues,
        }
    }
}

/// A finished capture and its refined cues.
#[derive(Clone, Debug, PartialEq)]
pub struct Capture {
    pub channels: u16,
    pub rate: u32,
    pub samples: Vec<Sample>,
    pub cues: Vec<AudioCue>,
}

impl Capture {
    pub fn total_frames(&self) -> u64 {
        (self.samples.len() / self.channels as usize) as u64
    }

    /// The interleaved samples of a clip, clamped to the capture.
    pub fn clip_samples(&self, clip: &Clip) -> &[Sample] {
        let total_frames = self.total_frames();
        let end = clip.end.min(total_frames);
        let start = clip.start.min(end);
        let channels = self.channels as usize;
        &self.samples[start as usize * channels..end as usize * channels]
    }
}

/// An audio interface that delivers captured frames to a writer until stopped.
pub trait Driver: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Starts delivering frames to the writer. The channel count and rate of the writer
    /// must be what the driver delivers.
    fn start(&self, writer: CaptureWriter) -> Result<(), Box<dyn Error>>;

    /// Stops delivering frames. The writer is released once this returns.
    fn stop(&self) -> Result<(), Box<dyn Error>>;
}

/// Lists the capture devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Driver>>, Box<dyn Error>> {
    cpal::Driver::list()
}

/// Gets a capture driver for the given audio configuration.
pub fn get_driver(config: &config::Audio) -> Result<Arc<dyn Driver>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Driver::get(device)));
    };

    Ok(Arc::new(cpal::Driver::get(
        device,
        config.channels()?,
        config.sample_rate()?,
    )?))
}
