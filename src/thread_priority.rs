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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the capture callback and dispatch threads when
/// SYNTHRECORD_THREAD_PRIORITY is unset.
const DEFAULT_THREAD_PRIORITY: u8 = 70;

fn parse_priority(value: &str) -> Option<ThreadPriorityValue> {
    let n = value.trim().parse::<u8>().ok()?;
    (n < 100).then(|| ThreadPriorityValue::try_from(n).ok())?
}

/// Reads SYNTHRECORD_THREAD_PRIORITY (0-99) once so the capture callback never touches
/// the environment.
pub fn callback_thread_priority() -> ThreadPriority {
    std::env::var("SYNTHRECORD_THREAD_PRIORITY")
        .ok()
        .and_then(|v| parse_priority(&v))
        .or_else(|| ThreadPriorityValue::try_from(DEFAULT_THREAD_PRIORITY).ok())
        .map(ThreadPriority::Crossplatform)
        .unwrap_or(ThreadPriority::Max)
}

fn is_truthy(value: &str) -> bool {
    value == "1"
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("on")
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the capture callback
/// and dispatch threads. Opt out with SYNTHRECORD_DISABLE_RT_AUDIO=1.
pub fn rt_audio_enabled() -> bool {
    !env_flag("SYNTHRECORD_DISABLE_RT_AUDIO")
}

/// Raises the priority of the calling thread once. Failures are logged and ignored.
pub fn configure_audio_thread_priority(
    priority: ThreadPriority,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    let _ = set_current_thread_priority(priority);

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            priority,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for audio thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for audio thread"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;

    *priority_set = true;
}

/// Raises the priority of the calling thread for event dispatch. The raise lasts as long as the
/// thread does.
pub fn raise_dispatch_thread_priority() {
    let mut priority_set = false;
    configure_audio_thread_priority(
        callback_thread_priority(),
        rt_audio_enabled(),
        &mut priority_set,
    );
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_priority_values() {
        assert!(parse_priority("50").is_some());
        assert!(parse_priority(" 0 ").is_some());
        assert!(parse_priority("99").is_some());
        assert!(parse_priority("100").is_none());
        assert!(parse_priority("-1").is_none());
        assert!(parse_priority("high").is_none());
    }

    #[test]
    fn test_truthy_flags() {
        for value in ["1", "true", "TRUE", "yes", "On"] {
            assert!(is_truthy(value), "{} should be truthy", value);
        }
        for value in ["0", "false", "", "nope"] {
            assert!(!is_truthy(value), "{} should not be truthy", value);
        }
    }
}
