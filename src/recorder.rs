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
use std::{fmt, io, mem, panic, sync::Arc, thread};

use midly::num::{u4, u7};
use serde::Serialize;
use tracing::{debug, error, info, span, warn, Level};

use crate::{
    capture::{self, AudioCue, CaptureBuffer, CueKind, Sample},
    clock::Pacer,
    export::{self, Exporter},
    midi,
    operator::Operator,
    playsync::CancelHandle,
    schedule::{self, Event, EventSchedule, NOTICE_TIME, PROGRAM_TIME},
    thread_priority, util,
};

/// How long before the end of a note's window its Off cue is recorded.
pub const OFF_CUE_LEAD_MS: i64 = 10;

/// Where a recording run is. Runs only move forward. Fatal and Cancelled are terminal and
/// never export anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Scheduled,
    NoticesDrained,
    BufferAllocated,
    Capturing,
    Draining,
    Stopped,
    Refined,
    Exported,
    Cancelled,
    Fatal,
}

/// Errors that stop a recording run.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("can't fit a capture buffer for {duration_ms}ms at {rate}Hz in memory")]
    BufferTooLarge { duration_ms: u64, rate: u32 },
    #[error("unable to create capture buffer: {0}")]
    Buffer(String),
    #[error("unable to start capture: {0}")]
    CaptureStart(String),
    #[error("unable to get confirmation from the operator: {0}")]
    Prompt(#[from] io::Error),
    #[error("recording hasn't been prepared")]
    NotPrepared,
    #[error("{exporter} export failed: {error}")]
    Export { exporter: String, error: String },
}

/// The note sequence to play.
#[derive(Clone, Debug)]
pub struct Playback {
    pub enabled: bool,
    pub min_note: u7,
    pub max_note: u7,
    /// How long each note is held.
    pub on_ms: i64,
    /// How long to wait after releasing a note before silencing everything.
    pub off_ms: i64,
    /// How long to wait after silencing everything before the next note.
    pub quiet_ms: i64,
    pub on_velocity: u7,
    pub off_velocity: u7,
}

impl Playback {
    /// The length of one note's window.
    pub fn note_window_ms(&self) -> i64 {
        self.on_ms + self.off_ms + self.quiet_ms
    }

    /// The number of notes that will be played.
    pub fn notes(&self) -> usize {
        if !self.enabled || self.min_note > self.max_note {
            return 0;
        }
        (self.max_note.as_int() - self.min_note.as_int()) as usize + 1
    }
}

/// What to do with the captured audio. Capture is skipped entirely when disabled.
pub struct Output {
    pub enabled: bool,
    /// Sample magnitude that counts as signal when refining cues.
    pub threshold: u32,
    /// Extra capture time on top of the schedule.
    pub safety_margin_ms: i64,
    pub exporters: Vec<Box<dyn Exporter>>,
}

/// Everything a run needs besides its devices.
pub struct Settings {
    /// Whether to send instrument programming before playback.
    pub program: bool,
    pub channels: u16,
    pub rate: u32,
    pub playback: Playback,
    pub output: Output,
}

/// A sound source driven over MIDI.
#[derive(Clone)]
pub struct Instrument {
    name: String,
    device: Arc<dyn midi::Device>,
    channel: u4,
    program: Option<u7>,
    control_changes: Vec<(u7, u7)>,
    /// Parameters that can't be set over MIDI and have to be set by hand.
    manual_parameters: Vec<(String, String)>,
}

impl Instrument {
    pub fn new(name: &str, device: Arc<dyn midi::Device>, channel: u4) -> Instrument {
        Instrument {
            name: name.to_string(),
            device,
            channel,
            program: None,
            control_changes: Vec::new(),
            manual_parameters: Vec::new(),
        }
    }

    pub fn with_program(mut self, program: u7) -> Instrument {
        self.program = Some(program);
        self
    }

    pub fn with_control_change(mut self, controller: u7, value: u7) -> Instrument {
        self.control_changes.push((controller, value));
        self
    }

    pub fn with_manual_parameter(mut self, parameter: &str, value: &str) -> Instrument {
        self.manual_parameters
            .push((parameter.to_string(), value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn notices(&self) -> impl Iterator<Item = String> + '_ {
        self.manual_parameters.iter().map(|(parameter, value)| {
            format!(
                "{}: -> set parameter '{}' to: {}",
                self.name, parameter, value
            )
        })
    }

    /// Schedules the programming for this instrument.
    fn program(&self, index: usize, schedule: &mut EventSchedule) {
        if let Some(program) = self.program {
            schedule.push(Event::midi(
                PROGRAM_TIME,
                index,
                midi::program_change(self.channel, program),
            ));
        }
        for (controller, value) in self.control_changes.iter() {
            schedule.push(Event::midi(
                PROGRAM_TIME,
                index,
                midi::control_change(self.channel, *controller, *value),
            ));
        }
        for notice in self.notices() {
            schedule.push(Event::notice(notice));
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} channel {}",
            self.name,
            self.device.name(),
            self.channel.as_int() + 1
        )
    }
}

/// Builds the full run: programming, notices, and every note's events and cues. Returns the
/// schedule and the number of cues in it.
pub fn build_schedule(settings: &Settings, instruments: &[Instrument]) -> (EventSchedule, usize) {
    let mut schedule = EventSchedule::new();
    let add_cues = settings.output.enabled;
    let mut cues = 0;

    if settings.program {
        for (index, instrument) in instruments.iter().enumerate() {
            instrument.program(index, &mut schedule);
        }
    } else {
        info!("Not programming instruments.");
    }

    let playback = &settings.playback;
    if !playback.enabled {
        info!("Not performing playback.");
        return (schedule, cues);
    }

    let mut time_ms = 0;
    for note in playback.min_note.as_int()..=playback.max_note.as_int() {
        let key = u7::from_int_lossy(note);
        let value = note as i32;

        // Pushed ahead of the note on so it's dispatched first.
        if add_cues {
            schedule.push(Event::cue(time_ms, CueKind::On, value));
            cues += 1;
        }

        let released = time_ms + playback.on_ms;
        let silenced = released + playback.off_ms;
        for (index, instrument) in instruments.iter().enumerate() {
            let channel = instrument.channel;
            schedule.push(Event::midi(
                time_ms,
                index,
                midi::note_on(channel, key, playback.on_velocity),
            ));
            schedule.push(Event::midi(
                released,
                index,
                midi::note_off(channel, key, playback.off_velocity),
            ));
            schedule.push(Event::midi(silenced, index, midi::all_notes_off(channel)));
        }
        time_ms = silenced + playback.quiet_ms;

        if add_cues {
            let off_time = (time_ms - OFF_CUE_LEAD_MS).max(released);
            schedule.push(Event::cue(off_time, CueKind::Off, value));
            cues += 1;
        }
    }

    for (index, instrument) in instruments.iter().enumerate() {
        schedule.push(Event::midi(
            time_ms,
            index,
            midi::all_notes_off(instrument.channel),
        ));
    }

    (schedule, cues)
}

/// Sizes the capture buffer for the schedule plus the safety margin.
pub fn buffer_frames(
    rate: u32,
    channels: u16,
    duration_ms: i64,
    safety_margin_ms: i64,
) -> Result<usize, RecordError> {
    let duration_ms = (duration_ms.max(0) as u64).saturating_add(safety_margin_ms.max(0) as u64);
    let too_large = || RecordError::BufferTooLarge { duration_ms, rate };

    let frames = (rate as u64)
        .checked_mul(duration_ms)
        .ok_or_else(too_large)?
        / 1000;
    let bytes = frames
        .checked_mul(channels as u64)
        .and_then(|samples| samples.checked_mul(mem::size_of::<Sample>() as u64))
        .ok_or_else(too_large)?;
    if bytes > isize::MAX as u64 {
        return Err(too_large());
    }

    usize::try_from(frames).map_err(|_| too_large())
}

/// A summary of a run, shown before recording starts.
#[derive(Debug, Serialize)]
pub struct Plan {
    pub first_note: String,
    pub last_note: String,
    pub notes: usize,
    pub duration: String,
    pub buffer_frames: usize,
    pub events: usize,
    pub cues: usize,
    pub instruments: Vec<String>,
    pub notices: Vec<String>,
}

/// How a run ended.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Exported {
        frames: u64,
        cues: Vec<AudioCue>,
        clips: usize,
        files: usize,
    },
    Cancelled {
        frames: u64,
    },
}

/// A schedule the operator has agreed to record.
struct Prepared {
    schedule: EventSchedule,
    cues: usize,
    buffer_frames: usize,
}

/// Recorder runs a recording from schedule to export.
pub struct Recorder {
    settings: Settings,
    instruments: Vec<Instrument>,
    driver: Option<Arc<dyn capture::Driver>>,
    operator: Arc<dyn Operator>,
    cancel_handle: CancelHandle,
    state: RecorderState,
    prepared: Option<Prepared>,
}

impl Recorder {
    /// Creates a new recorder. The driver is only needed when output is enabled.
    pub fn new(
        settings: Settings,
        instruments: Vec<Instrument>,
        driver: Option<Arc<dyn capture::Driver>>,
        operator: Arc<dyn Operator>,
        cancel_handle: CancelHandle,
    ) -> Recorder {
        Recorder {
            settings,
            instruments,
            driver,
            operator,
            cancel_handle,
            state: RecorderState::Idle,
            prepared: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    fn transition(&mut self, state: RecorderState) {
        debug!(from = ?self.state, to = ?state, "Recorder state change.");
        self.state = state;
    }

    /// Works out what a run would do without touching any devices.
    pub fn plan(&self) -> Result<Plan, RecordError> {
        let (schedule, cues) = build_schedule(&self.settings, &self.instruments);
        self.plan_for(&schedule, cues)
    }

    fn plan_for(&self, schedule: &EventSchedule, cues: usize) -> Result<Plan, RecordError> {
        let playback = &self.settings.playback;
        let buffer_frames = if self.settings.output.enabled {
            buffer_frames(
                self.settings.rate,
                self.settings.channels,
                schedule.total_duration(),
                self.settings.output.safety_margin_ms,
            )?
        } else {
            0
        };

        Ok(Plan {
            first_note: midi::note_name(playback.min_note.as_int() as u32),
            last_note: midi::note_name(playback.max_note.as_int() as u32),
            notes: playback.notes(),
            duration: util::duration_display(schedule.total_duration()),
            buffer_frames,
            events: schedule.len(),
            cues,
            instruments: self.instruments.iter().map(|i| i.to_string()).collect(),
            notices: if self.settings.program {
                self.instruments.iter().flat_map(|i| i.notices()).collect()
            } else {
                Vec::new()
            },
        })
    }

    /// Prepares and records in one go.
    pub fn run(&mut self) -> Result<Outcome, RecordError> {
        if !self.prepare()? {
            return Ok(Outcome::Cancelled { frames: 0 });
        }
        self.record()
    }

    /// Builds the schedule, shows the operator any notices and asks them to start. Returns
    /// false if they declined. Any error leaves the recorder in the Fatal state.
    pub fn prepare(&mut self) -> Result<bool, RecordError> {
        let span = span!(Level::INFO, "prepare");
        let _enter = span.enter();

        let result = self.try_prepare();
        self.fail_on_error(result)
    }

    /// Captures, refines and exports a prepared run. Any error leaves the recorder in the
    /// Fatal state.
    pub fn record(&mut self) -> Result<Outcome, RecordError> {
        let span = span!(Level::INFO, "record");
        let _enter = span.enter();

        let result = self.try_record();
        self.fail_on_error(result)
    }

    fn fail_on_error<T>(&mut self, result: Result<T, RecordError>) -> Result<T, RecordError> {
        if let Err(e) = &result {
            error!(err = %e, state = ?self.state, "Recording failed.");
            self.transition(RecorderState::Fatal);
        }
        result
    }

    fn sinks(&self) -> Vec<Arc<dyn midi::Device>> {
        self.instruments
            .iter()
            .map(|instrument| instrument.device.clone())
            .collect()
    }

    fn try_prepare(&mut self) -> Result<bool, RecordError> {
        let (mut schedule, cues) = build_schedule(&self.settings, &self.instruments);
        self.transition(RecorderState::Scheduled);

        let plan = self.plan_for(&schedule, cues)?;
        info!(
            first_note = plan.first_note.as_str(),
            last_note = plan.last_note.as_str(),
            notes = plan.notes,
            duration = plan.duration.as_str(),
            buffer_frames = plan.buffer_frames,
            events = plan.events,
            cues,
            "Recording plan."
        );
        for (index, instrument) in plan.instruments.iter().enumerate() {
            info!(index, instrument = instrument.as_str(), "Instrument.");
        }

        let sinks = self.sinks();
        while schedule.next_time() == Some(NOTICE_TIME) {
            if let Some(event) = schedule.pop() {
                schedule::dispatch(event, &sinks, None, self.operator.as_ref());
            }
        }
        self.transition(RecorderState::NoticesDrained);

        if !self.operator.confirm("Ready to record?")? {
            info!("Recording declined by the operator.");
            self.transition(RecorderState::Cancelled);
            return Ok(false);
        }

        self.prepared = Some(Prepared {
            schedule,
            cues,
            buffer_frames: plan.buffer_frames,
        });
        Ok(true)
    }

    fn try_record(&mut self) -> Result<Outcome, RecordError> {
        let Some(Prepared {
            mut schedule,
            cues,
            buffer_frames,
        }) = self.prepared.take()
        else {
            return Err(RecordError::NotPrepared);
        };

        if self.cancel_handle.is_cancelled() {
            info!("Recording cancelled before capture started.");
            self.transition(RecorderState::Cancelled);
            return Ok(Outcome::Cancelled { frames: 0 });
        }

        let mut buffer = if self.settings.output.enabled {
            let mut buffer = CaptureBuffer::new(self.settings.channels, self.settings.rate)
                .map_err(|e| RecordError::Buffer(e.to_string()))?;
            buffer.resize(buffer_frames);
            buffer.reserve_cues(cues);
            self.transition(RecorderState::BufferAllocated);

            let driver = self
                .driver
                .as_ref()
                .ok_or_else(|| RecordError::CaptureStart("no capture device".to_string()))?;
            driver
                .start(buffer.writer())
                .map_err(|e| RecordError::CaptureStart(e.to_string()))?;
            info!(device = %driver, "Capture started.");
            self.transition(RecorderState::Capturing);
            Some(buffer)
        } else {
            info!("Not capturing audio.");
            None
        };

        self.transition(RecorderState::Draining);
        let sinks = self.sinks();
        let recorder: &Recorder = self;
        let target = buffer.as_mut();
        // The raised dispatch priority ends with this thread.
        let completed = thread::scope(|scope| {
            scope
                .spawn(move || recorder.drain(&mut schedule, &sinks, target))
                .join()
        })
        .unwrap_or_else(|e| panic::resume_unwind(e));

        if buffer.is_some() {
            if let Some(driver) = self.driver.as_ref() {
                if let Err(e) = driver.stop() {
                    error!(err = e.as_ref(), device = %driver, "Error stopping capture.");
                }
            }
        }
        self.transition(RecorderState::Stopped);

        let mut buffer = match buffer {
            Some(buffer) => buffer,
            None if completed => {
                self.transition(RecorderState::Exported);
                return Ok(Outcome::Exported {
                    frames: 0,
                    cues: Vec::new(),
                    clips: 0,
                    files: 0,
                });
            }
            None => {
                self.transition(RecorderState::Cancelled);
                return Ok(Outcome::Cancelled { frames: 0 });
            }
        };

        let frames = buffer.total_frames();
        info!(frames, "Capture stopped.");
        if !completed {
            // Give back what was never written.
            buffer.resize(frames as usize);
            self.transition(RecorderState::Cancelled);
            return Ok(Outcome::Cancelled { frames });
        }

        for cue in buffer.cues() {
            debug!(frame = cue.frame, kind = %cue.kind, value = cue.value, "Recorded cue.");
        }
        buffer.refine_cues(self.settings.output.threshold);
        self.transition(RecorderState::Refined);
        for cue in buffer.cues() {
            debug!(frame = cue.frame, kind = %cue.kind, value = cue.value, "Refined cue.");
        }

        let capture = buffer.into_capture();
        let clips = export::pair_clips(&capture.cues).len();
        let mut files = 0;
        for exporter in self.settings.output.exporters.iter() {
            files += exporter
                .export(&capture)
                .map_err(|e| RecordError::Export {
                    exporter: exporter.name().to_string(),
                    error: e.to_string(),
                })?;
        }
        info!(clips, files, "Export finished.");
        self.transition(RecorderState::Exported);

        Ok(Outcome::Exported {
            frames,
            cues: capture.cues,
            clips,
            files,
        })
    }

    /// Dispatches the rest of the schedule in real time. Returns false if the run was
    /// cancelled part way through.
    fn drain(
        &self,
        schedule: &mut EventSchedule,
        sinks: &[Arc<dyn midi::Device>],
        mut buffer: Option<&mut CaptureBuffer>,
    ) -> bool {
        thread_priority::raise_dispatch_thread_priority();

        let mut pacer = Pacer::new(self.cancel_handle.clone());
        while let Some(next_time) = schedule.next_time() {
            if !pacer.wait(next_time - schedule.previous_time()) {
                warn!(
                    time_ms = schedule.previous_time(),
                    remaining_ms = schedule.remaining_duration(),
                    "Recording cancelled, silencing instruments."
                );
                self.silence();
                return false;
            }

            if let Some(event) = schedule.pop() {
                schedule::dispatch(
                    event,
                    sinks,
                    buffer.as_deref_mut(),
                    self.operator.as_ref(),
                );
            }
        }
        true
    }

    fn silence(&self) {
        for instrument in self.instruments.iter() {
            if let Err(e) = instrument
                .device
                .emit(midi::all_notes_off(instrument.channel))
            {
                error!(
                    err = e.as_ref(),
                    instrument = instrument.name.as_str(),
                    "Error silencing instrument."
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{path::Path, time::Duration};

    use super::*;
    use crate::{
        capture::mock,
        export::WavExporter,
        midi::test::Device,
        operator::test::Recording,
        schedule::EventKind,
    };

    fn seven_bit(value: u8) -> u7 {
        u7::from_int_lossy(value)
    }

    fn playback(min_note: u8, max_note: u8, on_ms: i64, off_ms: i64, quiet_ms: i64) -> Playback {
        Playback {
            enabled: true,
            min_note: seven_bit(min_note),
            max_note: seven_bit(max_note),
            on_ms,
            off_ms,
            quiet_ms,
            on_velocity: seven_bit(100),
            off_velocity: seven_bit(64),
        }
    }

    fn settings(playback: Playback, output_dir: Option<&Path>) -> Settings {
        Settings {
            program: true,
            channels: 1,
            rate: 8000,
            playback,
            output: Output {
                enabled: output_dir.is_some(),
                threshold: 1,
                safety_margin_ms: 1000,
                exporters: output_dir
                    .map(|dir| {
                        let exporter: Box<dyn Exporter> = Box::new(WavExporter::new(dir));
                        vec![exporter]
                    })
                    .unwrap_or_default(),
            },
        }
    }

    fn instrument(device: &Arc<Device>) -> Instrument {
        Instrument::new("psr", device.clone(), u4::from_int_lossy(0))
            .with_program(seven_bit(5))
            .with_control_change(seven_bit(7), seven_bit(100))
            .with_manual_parameter("Sustain", "0")
    }

    fn recorder(
        settings: Settings,
        device: &Arc<Device>,
        driver: &str,
        operator: Arc<dyn Operator>,
        cancel_handle: CancelHandle,
    ) -> Recorder {
        Recorder::new(
            settings,
            vec![instrument(device)],
            Some(Arc::new(mock::Driver::get(driver))),
            operator,
            cancel_handle,
        )
    }

    #[test]
    fn test_schedule_for_three_notes() {
        let device = Arc::new(Device::get("mock-schedule"));
        let settings = settings(
            playback(60, 62, 1000, 500, 100),
            Some(Path::new("unused")),
        );

        let (mut schedule, cues) = build_schedule(&settings, &[instrument(&device)]);
        assert_eq!(4800, schedule.total_duration());
        assert_eq!(6, cues);

        let mut cue_times = Vec::new();
        let mut last_kind: Option<EventKind> = None;
        while let Some(event) = schedule.pop() {
            if let EventKind::Cue { kind, value } = event.kind {
                cue_times.push((event.time_ms, kind, value));
            }
            // Every note on directly follows its On cue.
            if let EventKind::Midi { message, .. } = &event.kind {
                if let midly::live::LiveEvent::Midi {
                    message: midly::MidiMessage::NoteOn { key, .. },
                    ..
                } = message
                {
                    assert_eq!(
                        Some(EventKind::Cue {
                            kind: CueKind::On,
                            value: key.as_int() as i32
                        }),
                        last_kind
                    );
                }
            }
            last_kind = Some(event.kind);
        }

        assert_eq!(
            vec![
                (0, CueKind::On, 60),
                (1590, CueKind::Off, 60),
                (1600, CueKind::On, 61),
                (3190, CueKind::Off, 61),
                (3200, CueKind::On, 62),
                (4790, CueKind::Off, 62),
            ],
            cue_times
        );
    }

    #[test]
    fn test_schedule_without_output_or_program() {
        let device = Arc::new(Device::get("mock-schedule"));
        let mut settings = settings(playback(60, 61, 100, 100, 100), None);
        settings.program = false;

        let (schedule, cues) = build_schedule(&settings, &[instrument(&device)]);
        assert_eq!(0, cues);
        // Two notes of three events each plus the final all notes off.
        assert_eq!(7, schedule.len());
        assert_eq!(600, schedule.total_duration());
    }

    #[test]
    fn test_off_cue_never_precedes_note_off() {
        let device = Arc::new(Device::get("mock-schedule"));
        let settings = settings(playback(60, 60, 50, 2, 3), Some(Path::new("unused")));

        let (mut schedule, _) = build_schedule(&settings, &[instrument(&device)]);
        let mut off_cue = None;
        while let Some(event) = schedule.pop() {
            if let EventKind::Cue {
                kind: CueKind::Off, ..
            } = event.kind
            {
                off_cue = Some(event.time_ms);
            }
        }
        assert_eq!(Some(50), off_cue);
    }

    #[test]
    fn test_buffer_sizing() {
        assert_eq!(
            Ok(48000 * 35),
            buffer_frames(48000, 2, 5000, 30_000).map_err(|e| e.to_string())
        );
        assert_eq!(
            Ok(8000),
            buffer_frames(8000, 1, -3, 1000).map_err(|e| e.to_string())
        );
        assert!(matches!(
            buffer_frames(192_000, 32, i64::MAX, i64::MAX),
            Err(RecordError::BufferTooLarge { .. })
        ));
        assert!(matches!(
            buffer_frames(192_000, 32, 1 << 50, 0),
            Err(RecordError::BufferTooLarge { .. })
        ));
    }

    #[test]
    fn test_plan_summary() {
        let device = Arc::new(Device::get("mock-plan"));
        let recorder = recorder(
            settings(playback(60, 62, 1000, 500, 100), Some(Path::new("unused"))),
            &device,
            "mock-capture",
            Arc::new(Recording::default()),
            CancelHandle::new(),
        );

        let plan = recorder.plan().expect("plan");
        assert_eq!("C4", plan.first_note);
        assert_eq!("D4", plan.last_note);
        assert_eq!(3, plan.notes);
        assert_eq!("0:04.800", plan.duration);
        assert_eq!(8000 * 5800 / 1000, plan.buffer_frames);
        assert_eq!(6, plan.cues);
        assert_eq!(vec!["psr on mock-plan channel 1"], plan.instruments);
        assert_eq!(vec!["psr: -> set parameter 'Sustain' to: 0"], plan.notices);
        assert_eq!(RecorderState::Idle, recorder.state());
    }

    #[test]
    fn test_records_and_exports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let device = Arc::new(Device::get("mock-synth"));
        let operator = Arc::new(Recording::default());
        let mut recorder = recorder(
            settings(playback(60, 62, 20, 10, 20), Some(dir.path())),
            &device,
            "mock-capture",
            operator.clone(),
            CancelHandle::new(),
        );

        let outcome = recorder.run().expect("run");
        assert_eq!(RecorderState::Exported, recorder.state());

        let (frames, cues, clips, files) = match outcome {
            Outcome::Exported {
                frames,
                cues,
                clips,
                files,
            } => (frames, cues, clips, files),
            Outcome::Cancelled { .. } => panic!("run was cancelled"),
        };
        assert!(frames > 0);
        assert_eq!(3, clips);
        assert_eq!(3, files);
        assert_eq!(6, cues.len());
        for pair in cues.windows(2) {
            assert!(pair[0].frame < pair[1].frame, "{:?}", pair);
        }
        for name in ["C4.wav", "C#4.wav", "D4.wav"] {
            assert!(dir.path().join(name).exists(), "{} is missing", name);
        }

        assert_eq!(
            vec!["psr: -> set parameter 'Sustain' to: 0".to_string()],
            operator.notices()
        );
        assert_eq!(1, operator.prompts().len());

        let emitted = device.emitted();
        assert_eq!(12, emitted.len());
        assert_eq!(vec![0xC0, 5], emitted[0]);
        assert_eq!(vec![0xB0, 7, 100], emitted[1]);
        assert_eq!(vec![0x90, 60, 100], emitted[2]);
        assert_eq!(vec![0x80, 60, 64], emitted[3]);
        assert_eq!(vec![0xB0, 123, 0], emitted[4]);
        assert_eq!(vec![0xB0, 123, 0], emitted[11]);
    }

    #[test]
    fn test_capture_start_failure_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("output");
        let device = Arc::new(Device::get("mock-synth"));
        let mut recorder = recorder(
            settings(playback(60, 62, 20, 10, 20), Some(&output)),
            &device,
            "mock-fail",
            Arc::new(Recording::default()),
            CancelHandle::new(),
        );

        assert!(matches!(
            recorder.run(),
            Err(RecordError::CaptureStart(_))
        ));
        assert_eq!(RecorderState::Fatal, recorder.state());
        assert!(!output.exists());
        assert!(device.emitted().is_empty());
    }

    #[test]
    fn test_oversized_buffer_is_fatal() {
        let device = Arc::new(Device::get("mock-synth"));
        let mut settings = settings(playback(60, 60, 20, 10, 20), Some(Path::new("unused")));
        settings.output.safety_margin_ms = i64::MAX;
        let mut recorder = recorder(
            settings,
            &device,
            "mock-capture",
            Arc::new(Recording::default()),
            CancelHandle::new(),
        );

        assert!(matches!(
            recorder.run(),
            Err(RecordError::BufferTooLarge { .. })
        ));
        assert_eq!(RecorderState::Fatal, recorder.state());
    }

    #[test]
    fn test_cancelled_run_silences_instruments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let device = Arc::new(Device::get("mock-synth"));
        let cancel_handle = CancelHandle::new();
        let mut recorder = recorder(
            settings(playback(60, 62, 200, 100, 100), Some(dir.path())),
            &device,
            "mock-capture",
            Arc::new(Recording::default()),
            cancel_handle.clone(),
        );

        let canceller = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                cancel_handle.cancel();
            })
        };
        let outcome = recorder.run().expect("run");
        canceller.join().expect("join");

        match outcome {
            Outcome::Cancelled { frames } => assert!(frames > 0),
            Outcome::Exported { .. } => panic!("run wasn't cancelled"),
        }
        assert_eq!(RecorderState::Cancelled, recorder.state());

        let emitted = device.emitted();
        assert_eq!(Some(&vec![0xB0, 123, 0]), emitted.last());
        assert!(emitted.contains(&vec![0x90, 60, 100]));
        assert!(!emitted.contains(&vec![0x90, 62, 100]));
        assert!(!dir.path().join("C4.wav").exists());
    }

    #[test]
    fn test_cancel_before_capture_starts_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("output");
        let device = Arc::new(Device::get("mock-synth"));
        let cancel_handle = CancelHandle::new();
        // A failing capture device makes any attempt to start capture fatal.
        let mut recorder = recorder(
            settings(playback(60, 62, 20, 10, 20), Some(&output)),
            &device,
            "mock-fail",
            Arc::new(Recording::default()),
            cancel_handle.clone(),
        );

        assert!(recorder.prepare().expect("prepare"));
        assert_eq!(RecorderState::NoticesDrained, recorder.state());

        cancel_handle.cancel();
        assert_eq!(
            Outcome::Cancelled { frames: 0 },
            recorder.record().expect("record")
        );
        assert_eq!(RecorderState::Cancelled, recorder.state());
        assert!(device.emitted().is_empty());
        assert!(!output.exists());
    }

    #[test]
    fn test_record_needs_prepare() {
        let device = Arc::new(Device::get("mock-synth"));
        let mut recorder = recorder(
            settings(playback(60, 60, 20, 10, 20), None),
            &device,
            "mock-capture",
            Arc::new(Recording::default()),
            CancelHandle::new(),
        );

        assert!(matches!(recorder.record(), Err(RecordError::NotPrepared)));
        assert_eq!(RecorderState::Fatal, recorder.state());
        assert!(device.emitted().is_empty());
    }

    #[test]
    fn test_declined_run_does_nothing() {
        let device = Arc::new(Device::get("mock-synth"));
        let mut recorder = recorder(
            settings(playback(60, 62, 20, 10, 20), None),
            &device,
            "mock-capture",
            Arc::new(Recording::declining()),
            CancelHandle::new(),
        );

        assert_eq!(
            Outcome::Cancelled { frames: 0 },
            recorder.run().expect("run")
        );
        assert_eq!(RecorderState::Cancelled, recorder.state());
        assert!(device.emitted().is_empty());
    }

    #[test]
    fn test_no_notes_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let device = Arc::new(Device::get("mock-synth"));
        let mut playback = playback(60, 62, 20, 10, 20);
        playback.enabled = false;
        let mut recorder = recorder(
            settings(playback, Some(dir.path())),
            &device,
            "mock-capture",
            Arc::new(Recording::default()),
            CancelHandle::new(),
        );

        match recorder.run().expect("run") {
            Outcome::Exported {
                cues, clips, files, ..
            } => {
                assert!(cues.is_empty());
                assert_eq!(0, clips);
                assert_eq!(0, files);
            }
            Outcome::Cancelled { .. } => panic!("run was cancelled"),
        }
        assert_eq!(RecorderState::Exported, recorder.state());
    }

    #[test]
    fn test_playback_without_capture() {
        let device = Arc::new(Device::get("mock-synth"));
        let mut recorder = Recorder::new(
            settings(playback(60, 60, 5, 5, 5), None),
            vec![instrument(&device)],
            None,
            Arc::new(Recording::default()),
            CancelHandle::new(),
        );

        assert_eq!(
            Outcome::Exported {
                frames: 0,
                cues: Vec::new(),
                clips: 0,
                files: 0
            },
            recorder.run().expect("run")
        );
        assert_eq!(RecorderState::Exported, recorder.state());
        assert_eq!(6, device.emitted().len());
    }
}
