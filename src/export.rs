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
    collections::HashMap,
    error::Error,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{info, span, Level};

use crate::{
    capture::{AudioCue, Capture, CueKind},
    midi, util,
};

/// A span of captured frames belonging to a single note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clip {
    /// The first frame of the clip.
    pub start: u64,
    /// The frame after the last frame of the clip.
    pub end: u64,
    /// The note the clip was played with, or AudioCue::WHOLE_CAPTURE.
    pub note: i32,
}

impl Clip {
    pub fn frames(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// The file stem for the clip, e.g. C#4.
    pub fn name(&self) -> String {
        if self.note < 0 {
            String::from("capture")
        } else {
            midi::note_name(self.note as u32)
        }
    }
}

/// Pairs each On cue with the Off cue right after it. The notes of a pair must match unless
/// either one is negative. Anything else is skipped.
pub fn pair_clips(cues: &[AudioCue]) -> Vec<Clip> {
    let mut clips = Vec::new();
    let mut i = 0;
    while i + 1 < cues.len() {
        let (on, off) = (&cues[i], &cues[i + 1]);
        let notes_match = on.value == off.value || on.value < 0 || off.value < 0;
        if on.kind == CueKind::On && off.kind == CueKind::Off && notes_match {
            clips.push(Clip {
                start: on.frame,
                end: off.frame,
                note: on.value.max(off.value),
            });
            i += 2;
        } else {
            i += 1;
        }
    }
    clips
}

/// Writes a finished capture somewhere.
pub trait Exporter: Send + Sync {
    fn name(&self) -> &str;

    /// Exports the capture. Returns the number of files written.
    fn export(&self, capture: &Capture) -> Result<usize, Box<dyn Error>>;
}

/// Writes one 16 bit WAV file per clip.
pub struct WavExporter {
    directory: PathBuf,
}

impl WavExporter {
    pub fn new(directory: impl Into<PathBuf>) -> WavExporter {
        WavExporter {
            directory: directory.into(),
        }
    }

    fn write_clip(
        &self,
        path: &Path,
        capture: &Capture,
        clip: &Clip,
    ) -> Result<(), Box<dyn Error>> {
        let mut writer = WavWriter::create(
            path,
            WavSpec {
                channels: capture.channels,
                sample_rate: capture.rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        )?;
        for sample in capture.clip_samples(clip) {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

impl Exporter for WavExporter {
    fn name(&self) -> &str {
        "wav"
    }

    fn export(&self, capture: &Capture) -> Result<usize, Box<dyn Error>> {
        let span = span!(Level::INFO, "export (wav)");
        let _enter = span.enter();

        fs::create_dir_all(&self.directory)?;

        let mut seen: HashMap<String, usize> = HashMap::new();
        let clips = pair_clips(&capture.cues);
        for clip in clips.iter() {
            let name = clip.name();
            let count = seen.entry(name.clone()).or_default();
            *count += 1;
            let file_name = if *count == 1 {
                format!("{}.wav", name)
            } else {
                format!("{}-{}.wav", name, count)
            };

            let path = self.directory.join(file_name);
            self.write_clip(&path, capture, clip)?;
            info!(
                file = util::filename_display(&path),
                frames = clip.frames(),
                "Wrote clip."
            );
        }

        Ok(clips.len())
    }
}

/// Dumps the whole capture as little endian 16 bit samples with no header.
pub struct RawExporter {
    path: PathBuf,
}

impl RawExporter {
    pub fn new(path: impl Into<PathBuf>) -> RawExporter {
        RawExporter { path: path.into() }
    }
}

impl Exporter for RawExporter {
    fn name(&self) -> &str {
        "raw"
    }

    fn export(&self, capture: &Capture) -> Result<usize, Box<dyn Error>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(&self.path)?);
        for sample in capture.samples.iter() {
            writer.write_all(&sample.to_le_bytes())?;
        }
        writer.flush()?;

        info!(
            file = util::filename_display(&self.path),
            frames = capture.total_frames(),
            "Wrote raw capture."
        );
        Ok(1)
    }
}
