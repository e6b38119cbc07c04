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

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Returns the name of a MIDI note, from C-1 (0) to G9 (127). Values outside of the MIDI
/// range are named "n/a".
pub fn note_name(note: u32) -> String {
    if note > 127 {
        return String::from("n/a");
    }

    let octave = (note / 12) as i32 - 1;
    format!("{}{}", PITCH_CLASSES[(note % 12) as usize], octave)
}

/// Parses a note name such as C4, C#4, Cs4, Db4 or C-1 into a MIDI note. The octave is a
/// single digit, optionally negative only as -1.
pub fn note_value(note: &str) -> Option<u8> {
    let mut chars = note.chars().peekable();

    let mut value: i32 = match chars.next()?.to_ascii_lowercase() {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };

    if chars.next_if(|c| *c == '#' || *c == 's').is_some() {
        value += 1;
    }
    if chars.next_if_eq(&'b').is_some() {
        value -= 1;
    }

    let negative = chars.next_if_eq(&'-').is_some();
    let digit = chars.next()?.to_digit(10)? as i32;
    if chars.next().is_some() {
        return None;
    }

    let octave = if negative { -digit } else { digit };
    if octave < -1 {
        return None;
    }

    let midi_note = (octave + 1) * 12 + value;
    if !(0..=127).contains(&midi_note) {
        return None;
    }
    Some(midi_note as u8)
}
