//! MML (music macro language) parsing.
//!
//! The sequencer consumes one command at a time from a per-voice cursor;
//! zero-width commands (tempo, instrument, effect setup) are applied
//! immediately and parsing continues until a timed event (note, rest,
//! arpeggio) or the end of the string. The grammar is case-insensitive;
//! whitespace and `|` are ignored, unknown characters are skipped.

/// Ticks per whole note; a quarter note is 96 ticks.
pub const WHOLE_NOTE_TICKS: u32 = 384;

/// Default octave at sequence start.
pub const DEFAULT_OCTAVE: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Low,
    Band,
    High,
    Off,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MmlEvent {
    /// Note-on for `ticks`; `portamento` slides from the previous pitch.
    Note {
        semitone: u8,
        ticks: u32,
        portamento: bool,
    },
    Rest {
        ticks: u32,
    },
    /// `{c e g}len`: cycle one listed note per frame for the duration.
    Arpeggio {
        semitones: Vec<u8>,
        ticks: u32,
    },
    Tempo(u16),
    Instrument(u8),
    Vibrato(u8),
    PulseWidth(u16),
    /// Pulse width sweep per frame: -32, 0 or +32.
    PwmSweep(i16),
    FilterCutoff {
        cutoff: u16,
        resonance: Option<u8>,
    },
    FilterMode(FilterMode),
    /// Filter cutoff sweep per frame: -8, 0 or +8.
    FilterSweep(i16),
}

/// Semitone offsets of note letters A-G within an octave (C = 0).
const NOTE_BASE: [i32; 7] = [9, 11, 0, 2, 4, 5, 7];

#[derive(Clone, Copy)]
struct Repeat {
    start: usize,
    /// Jumps still to take; `None` until the closing bracket is first
    /// reached and the count is known.
    remaining: Option<u8>,
}

/// Cursor over one voice's MML text.
#[derive(Clone)]
pub struct MmlParser {
    text: Vec<u8>,
    pos: usize,
    octave: u8,
    default_ticks: u32,
    repeat: Option<Repeat>,
}

impl MmlParser {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.as_bytes().to_vec(),
            pos: 0,
            octave: DEFAULT_OCTAVE,
            default_ticks: WHOLE_NOTE_TICKS / 4,
            repeat: None,
        }
    }

    /// Restart from the beginning with fresh parser state.
    pub fn rewind(&mut self) {
        self.pos = 0;
        self.octave = DEFAULT_OCTAVE;
        self.default_ticks = WHOLE_NOTE_TICKS / 4;
        self.repeat = None;
    }

    fn peek(&self) -> Option<u8> {
        self.text.get(self.pos).map(|b| b.to_ascii_lowercase())
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_filler(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b == b'|' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn number(&mut self) -> Option<u32> {
        let mut value: Option<u32> = None;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                value = Some(value.unwrap_or(0) * 10 + (b - b'0') as u32);
                self.pos += 1;
            } else {
                break;
            }
        }
        value
    }

    /// Length suffix: optional denominator (1,2,4,8,16,32) and optional
    /// dot extending by half.
    fn length_ticks(&mut self) -> u32 {
        let mut ticks = match self.number() {
            Some(n) if n >= 1 => WHOLE_NOTE_TICKS / n.min(WHOLE_NOTE_TICKS),
            _ => self.default_ticks,
        };
        if self.eat(b'.') {
            ticks += ticks / 2;
        }
        ticks.max(1)
    }

    /// Note letter (already consumed) plus accidentals into an absolute
    /// semitone, clamped to octaves 1-7.
    fn semitone(&mut self, letter: u8) -> u8 {
        let mut s = self.octave as i32 * 12 + NOTE_BASE[(letter - b'a') as usize];
        loop {
            match self.peek() {
                Some(b'#') | Some(b'+') => {
                    s += 1;
                    self.pos += 1;
                }
                Some(b'-') => {
                    s -= 1;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        s.clamp(12, 95) as u8
    }

    /// Consume the next timed or control command. `None` means the
    /// sequence ended.
    pub fn next_event(&mut self) -> Option<MmlEvent> {
        loop {
            self.skip_filler();
            let b = self.bump()?;
            match b {
                b'a'..=b'g' => return Some(self.note(b, false)),
                b'r' => {
                    let ticks = self.length_ticks();
                    return Some(MmlEvent::Rest { ticks });
                }
                b'o' => {
                    if let Some(n) = self.number() {
                        self.octave = (n as u8).clamp(1, 7);
                    }
                }
                b'<' => self.octave = (self.octave - 1).max(1),
                b'>' => self.octave = (self.octave + 1).min(7),
                b'l' => {
                    if let Some(n) = self.number()
                        && n >= 1
                    {
                        let mut ticks = WHOLE_NOTE_TICKS / n.min(WHOLE_NOTE_TICKS);
                        if self.eat(b'.') {
                            ticks += ticks / 2;
                        }
                        self.default_ticks = ticks.max(1);
                    }
                }
                b't' => {
                    if let Some(n) = self.number() {
                        return Some(MmlEvent::Tempo(n.clamp(1, 999) as u16));
                    }
                }
                b'i' => {
                    if let Some(n) = self.number() {
                        return Some(MmlEvent::Instrument((n & 0x0F) as u8));
                    }
                }
                b'v' => {
                    if let Some(n) = self.number() {
                        return Some(MmlEvent::Vibrato(n.min(15) as u8));
                    }
                }
                b'/' => {
                    // Portamento prefix: slide into the next note.
                    self.skip_filler();
                    if let Some(letter @ b'a'..=b'g') = self.peek() {
                        self.pos += 1;
                        return Some(self.note(letter, true));
                    }
                }
                b'&' => {} // stray tie: ignored
                b'[' => {
                    if self.repeat.is_none() {
                        self.repeat = Some(Repeat {
                            start: self.pos,
                            remaining: None,
                        });
                    }
                }
                b']' => {
                    let count = self.number().unwrap_or(1).clamp(1, 255) as u8;
                    if let Some(rep) = &mut self.repeat {
                        let remaining = rep.remaining.get_or_insert(count - 1);
                        if *remaining > 0 {
                            *remaining -= 1;
                            self.pos = rep.start;
                        } else {
                            self.repeat = None;
                        }
                    }
                }
                b'{' => return Some(self.arpeggio()),
                b'@' => {
                    if let Some(event) = self.extended() {
                        return Some(event);
                    }
                }
                _ => {} // unknown: skipped
            }
        }
    }

    fn note(&mut self, letter: u8, portamento: bool) -> MmlEvent {
        let semitone = self.semitone(letter);
        let mut ticks = self.length_ticks();
        // Ties concatenate following note durations into this note-on.
        loop {
            let mark = self.pos;
            self.skip_filler();
            if !self.eat(b'&') {
                self.pos = mark;
                break;
            }
            self.skip_filler();
            match self.peek() {
                Some(tied @ b'a'..=b'g') => {
                    self.pos += 1;
                    self.semitone(tied); // pitch of a tied note is ignored
                    ticks += self.length_ticks();
                }
                _ => break,
            }
        }
        MmlEvent::Note {
            semitone,
            ticks,
            portamento,
        }
    }

    fn arpeggio(&mut self) -> MmlEvent {
        let mut semitones = Vec::new();
        loop {
            self.skip_filler();
            match self.bump() {
                Some(b'}') | None => break,
                Some(letter @ b'a'..=b'g') => semitones.push(self.semitone(letter)),
                Some(b'<') => self.octave = (self.octave - 1).max(1),
                Some(b'>') => self.octave = (self.octave + 1).min(7),
                Some(_) => {}
            }
        }
        let ticks = self.length_ticks();
        if semitones.is_empty() {
            MmlEvent::Rest { ticks }
        } else {
            MmlEvent::Arpeggio { semitones, ticks }
        }
    }

    /// `@P`, `@PS`, `@F`, `@FL/@FB/@FH/@FO`, `@FS` extended commands.
    fn extended(&mut self) -> Option<MmlEvent> {
        match self.bump()? {
            b'p' => {
                if self.eat(b's') {
                    match self.bump()? {
                        b'+' => Some(MmlEvent::PwmSweep(32)),
                        b'-' => Some(MmlEvent::PwmSweep(-32)),
                        _ => Some(MmlEvent::PwmSweep(0)),
                    }
                } else {
                    let width = self.number()?.min(4095) as u16;
                    Some(MmlEvent::PulseWidth(width))
                }
            }
            b'f' => match self.peek() {
                Some(b'l') => {
                    self.pos += 1;
                    Some(MmlEvent::FilterMode(FilterMode::Low))
                }
                Some(b'b') => {
                    self.pos += 1;
                    Some(MmlEvent::FilterMode(FilterMode::Band))
                }
                Some(b'h') => {
                    self.pos += 1;
                    Some(MmlEvent::FilterMode(FilterMode::High))
                }
                Some(b'o') => {
                    self.pos += 1;
                    Some(MmlEvent::FilterMode(FilterMode::Off))
                }
                Some(b's') => {
                    self.pos += 1;
                    match self.bump()? {
                        b'+' => Some(MmlEvent::FilterSweep(8)),
                        b'-' => Some(MmlEvent::FilterSweep(-8)),
                        _ => Some(MmlEvent::FilterSweep(0)),
                    }
                }
                _ => {
                    let cutoff = self.number()?.min(2047) as u16;
                    let resonance = if self.eat(b',') {
                        self.number().map(|r| r.min(15) as u8)
                    } else {
                        None
                    };
                    Some(MmlEvent::FilterCutoff { cutoff, resonance })
                }
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(text: &str) -> Vec<MmlEvent> {
        let mut parser = MmlParser::new(text);
        let mut out = Vec::new();
        while let Some(e) = parser.next_event() {
            out.push(e);
        }
        out
    }

    #[test]
    fn notes_and_lengths() {
        let out = events("c4 d8 e16.");
        assert_eq!(
            out,
            vec![
                MmlEvent::Note {
                    semitone: 48,
                    ticks: 96,
                    portamento: false
                },
                MmlEvent::Note {
                    semitone: 50,
                    ticks: 48,
                    portamento: false
                },
                MmlEvent::Note {
                    semitone: 52,
                    ticks: 36,
                    portamento: false
                },
            ]
        );
    }

    #[test]
    fn accidentals_and_octaves() {
        let out = events("o5 c# > c <<< c-");
        assert_eq!(
            out,
            vec![
                MmlEvent::Note {
                    semitone: 61,
                    ticks: 96,
                    portamento: false
                },
                MmlEvent::Note {
                    semitone: 72,
                    ticks: 96,
                    portamento: false
                },
                // Three '<' steps down from octave 6, then a flat.
                MmlEvent::Note {
                    semitone: 35,
                    ticks: 96,
                    portamento: false
                },
            ]
        );
    }

    #[test]
    fn tie_concatenates_durations() {
        let out = events("c4&c4&c8");
        assert_eq!(
            out,
            vec![MmlEvent::Note {
                semitone: 48,
                ticks: 96 + 96 + 48,
                portamento: false
            }]
        );
    }

    #[test]
    fn default_length_and_rest() {
        let out = events("l8 c r c2");
        assert_eq!(
            out,
            vec![
                MmlEvent::Note {
                    semitone: 48,
                    ticks: 48,
                    portamento: false
                },
                MmlEvent::Rest { ticks: 48 },
                MmlEvent::Note {
                    semitone: 48,
                    ticks: 192,
                    portamento: false
                },
            ]
        );
    }

    #[test]
    fn repeat_plays_n_times() {
        let out = events("[c8]3 d8");
        assert_eq!(out.len(), 4);
        assert!(matches!(out[2], MmlEvent::Note { semitone: 48, .. }));
        assert!(matches!(out[3], MmlEvent::Note { semitone: 50, .. }));
    }

    #[test]
    fn arpeggio_collects_notes() {
        let out = events("{c e g}4");
        assert_eq!(
            out,
            vec![MmlEvent::Arpeggio {
                semitones: vec![48, 52, 55],
                ticks: 96
            }]
        );
    }

    #[test]
    fn extended_commands() {
        let out = events("t140 i3 v9 @p2048 @ps+ @f1000,12 @fl @fs-");
        assert_eq!(
            out,
            vec![
                MmlEvent::Tempo(140),
                MmlEvent::Instrument(3),
                MmlEvent::Vibrato(9),
                MmlEvent::PulseWidth(2048),
                MmlEvent::PwmSweep(32),
                MmlEvent::FilterCutoff {
                    cutoff: 1000,
                    resonance: Some(12)
                },
                MmlEvent::FilterMode(FilterMode::Low),
                MmlEvent::FilterSweep(-8),
            ]
        );
    }

    #[test]
    fn portamento_prefix() {
        let out = events("c4 /g4");
        assert!(matches!(
            out[1],
            MmlEvent::Note {
                semitone: 55,
                portamento: true,
                ..
            }
        ));
    }

    #[test]
    fn junk_is_skipped() {
        let out = events("c4 !? | x c4");
        assert_eq!(out.len(), 2);
    }
}
