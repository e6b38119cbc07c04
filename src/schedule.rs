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
use std::{cmp::Reverse, collections::BinaryHeap, fmt, sync::Arc};

use midly::live::LiveEvent;
use tracing::{debug, error, info};

use crate::{
    capture::{CaptureBuffer, CueKind},
    midi,
    operator::Operator,
};

/// The initial previous time of a schedule, before anything has been popped.
pub const START_TIME: i64 = -3;
/// Operator-facing notices are drained before playback at this time.
pub const NOTICE_TIME: i64 = -2;
/// Device programming commands are sent immediately before timed playback at this time.
pub const PROGRAM_TIME: i64 = -1;

/// The work an event performs when it is dispatched.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    /// Sends a MIDI message to the instrument at the given index.
    Midi {
        instrument: usize,
        message: LiveEvent<'static>,
    },
    /// Records a boundary cue on the capture buffer.
    Cue { kind: CueKind, value: i32 },
    /// Shows a message to the operator.
    Notice(String),
}

/// A unit of work scheduled for a point in time, in milliseconds.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub time_ms: i64,
    pub kind: EventKind,
}

impl Event {
    /// Creates a MIDI dispatch event.
    pub fn midi(time_ms: i64, instrument: usize, message: LiveEvent<'static>) -> Event {
        Event {
            time_ms,
            kind: EventKind::Midi {
                instrument,
                message,
            },
        }
    }

    /// Creates a cue marker event.
    pub fn cue(time_ms: i64, kind: CueKind, value: i32) -> Event {
        Event {
            time_ms,
            kind: EventKind::Cue { kind, value },
        }
    }

    /// Creates an operator notice. Notices always live at the notice time.
    pub fn notice(message: impl Into<String>) -> Event {
        Event {
            time_ms: NOTICE_TIME,
            kind: EventKind::Notice(message.into()),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EventKind::Midi {
                instrument,
                message,
            } => write!(f, "{}ms midi[{}] {:?}", self.time_ms, instrument, message),
            EventKind::Cue { kind, value } => {
                write!(f, "{}ms cue {} = {}", self.time_ms, kind, value)
            }
            EventKind::Notice(message) => write!(f, "{}ms notice: {}", self.time_ms, message),
        }
    }
}

/// A time ordered queue of events. Events are owned by an arena and the heap only
/// holds (time, insertion sequence, arena index) keys, so events sharing a time
/// are popped in the order they were pushed.
pub struct EventSchedule {
    arena: Vec<Option<Event>>,
    queue: BinaryHeap<Reverse<(i64, usize)>>,
    previous_time: i64,
    total_duration: i64,
}

impl EventSchedule {
    /// Creates an empty schedule.
    pub fn new() -> EventSchedule {
        EventSchedule {
            arena: Vec::new(),
            queue: BinaryHeap::new(),
            previous_time: START_TIME,
            total_duration: 0,
        }
    }

    /// Inserts an event.
    pub fn push(&mut self, event: Event) {
        self.total_duration = self.total_duration.max(event.time_ms);
        // The arena index doubles as the insertion sequence.
        let index = self.arena.len();
        self.queue.push(Reverse((event.time_ms, index)));
        self.arena.push(Some(event));
    }

    /// Removes and returns the earliest event. Returns None if the schedule is empty,
    /// which callers should rule out with has_next.
    pub fn pop(&mut self) -> Option<Event> {
        let Reverse((time_ms, index)) = self.queue.pop()?;
        self.previous_time = time_ms;
        self.arena[index].take()
    }

    /// Returns the earliest event without removing it.
    pub fn peek(&self) -> Option<&Event> {
        self.queue
            .peek()
            .and_then(|Reverse((_, index))| self.arena[*index].as_ref())
    }

    /// Returns true if there are events left.
    pub fn has_next(&self) -> bool {
        !self.queue.is_empty()
    }

    /// The time of the next event, if any.
    pub fn next_time(&self) -> Option<i64> {
        self.queue.peek().map(|Reverse((time_ms, _))| *time_ms)
    }

    /// The time of the most recently popped event.
    pub fn previous_time(&self) -> i64 {
        self.previous_time
    }

    /// The largest time pushed so far.
    pub fn total_duration(&self) -> i64 {
        self.total_duration
    }

    /// The time between the last popped event and the end of the schedule.
    pub fn remaining_duration(&self) -> i64 {
        self.total_duration - self.previous_time
    }

    /// The number of events left.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for EventSchedule {
    fn default() -> Self {
        Self::new()
    }
}

/// Performs the work of a single event. MIDI failures are logged rather than returned so
/// that one dropped message doesn't abort a long recording run. Cues are dropped when no
/// capture buffer is present.
pub fn dispatch(
    event: Event,
    sinks: &[Arc<dyn midi::Device>],
    buffer: Option<&mut CaptureBuffer>,
    operator: &dyn Operator,
) {
    match event.kind {
        EventKind::Midi {
            instrument,
            message,
        } => match sinks.get(instrument) {
            Some(sink) => {
                if let Err(e) = sink.emit(message) {
                    error!(
                        err = e.as_ref(),
                        device = sink.name(),
                        time_ms = event.time_ms,
                        "Error sending MIDI event."
                    );
                }
            }
            None => error!(instrument, "No MIDI device for instrument."),
        },
        EventKind::Cue { kind, value } => {
            if let Some(buffer) = buffer {
                let cue = buffer.cue(kind, value);
                debug!(frame = cue.frame, kind = %kind, value, "Cue.");
            }
        }
        EventKind::Notice(message) => {
            info!(notice = message, "Notice.");
            operator.notice(&message);
        }
    }
}
