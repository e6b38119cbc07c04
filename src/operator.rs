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
use std::io::{self, BufRead, Write};

use tracing::info;

/// The person running the recording. They get setup instructions that can't be sent over
/// MIDI and have to agree before capture starts.
pub trait Operator: Send + Sync {
    /// Shows a setup instruction.
    fn notice(&self, message: &str);

    /// Asks whether to proceed. Returns false if the operator declined.
    fn confirm(&self, prompt: &str) -> Result<bool, io::Error>;
}

/// An operator at a terminal. Notices and prompts go to stderr, answers come from stdin.
pub struct Terminal;

impl Operator for Terminal {
    fn notice(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn confirm(&self, prompt: &str) -> Result<bool, io::Error> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{} [Y/n] ", prompt)?;
        stderr.flush()?;

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer)? == 0 {
            // Closed stdin is never consent.
            return Ok(false);
        }
        Ok(is_yes(&answer))
    }
}

fn is_yes(answer: &str) -> bool {
    let answer = answer.trim();
    answer.is_empty() || answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

/// An operator that isn't there. Notices are logged and every prompt is accepted.
pub struct Unattended;

impl Operator for Unattended {
    fn notice(&self, message: &str) {
        info!(notice = message, "Operator notice.");
    }

    fn confirm(&self, prompt: &str) -> Result<bool, io::Error> {
        info!(prompt, "Proceeding without confirmation.");
        Ok(true)
    }
}
