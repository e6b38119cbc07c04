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
use tracing::{debug, span, Level};

use crate::capture::{AudioCue, CueKind, Sample};

/// Returns true if any channel of the frame is at or above the threshold.
#[inline]
fn is_loud(samples: &[Sample], channels: usize, frame: u64, threshold: u32) -> bool {
    let start = frame as usize * channels;
    samples[start..start + channels]
        .iter()
        .any(|sample| (*sample as i32).unsigned_abs() >= threshold)
}

/// Moves every cue inward to the signal it marks. On cues move forward to the first loud
/// frame and Off cues move backward to just after the last loud frame. Neither scan passes
/// the neighbouring cue, so adjacent clips can't overlap. Off cues are bounded by the
/// previous cue's refined position, which means the cues must be refined in order.
///
/// Cues past the end of the capture are left alone.
pub fn refine(
    samples: &[Sample],
    channels: u16,
    total_frames: u64,
    cues: &mut [AudioCue],
    threshold: u32,
) {
    let span = span!(Level::INFO, "refine cues");
    let _enter = span.enter();

    let channels = channels as usize;
    let total_frames = total_frames.min((samples.len() / channels) as u64);

    for i in 0..cues.len() {
        let cue = cues[i];
        if cue.frame > total_frames {
            debug!(
                frame = cue.frame,
                total_frames, "Cue is beyond the end of the capture, skipping."
            );
            continue;
        }

        let refined = match cue.kind {
            CueKind::On => {
                let bound = cues
                    .get(i + 1)
                    .map_or(total_frames, |next| next.frame)
                    .min(total_frames);

                let mut pos = cue.frame;
                while pos < bound && !is_loud(samples, channels, pos, threshold) {
                    pos += 1;
                }
                pos.max(cue.frame)
            }
            CueKind::Off => {
                let bound = if i > 0 { cues[i - 1].frame } else { 0 };

                let mut pos = cue.frame;
                while pos > bound && !is_loud(samples, channels, pos - 1, threshold) {
                    pos -= 1;
                }
                pos
            }
        };

        if refined != cue.frame {
            debug!(
                kind = %cue.kind,
                value = cue.value,
                from = cue.frame,
                to = refined,
                "Refined cue."
            );
        }
        cues[i].frame = refined;
    }
}
