pub mod mml;

pub use mml::{FilterMode, MmlEvent, MmlParser};

use crate::device::sid::{
    CTRL_GATE, CTRL_NOISE, CTRL_PULSE, CTRL_SAW, CTRL_TRI, SID_CLOCK_HZ, Sid,
};
use log::debug;
use std::collections::VecDeque;

/// Voices 1-6 map to SID1 voices 1-3 and SID2 voices 1-3.
pub const VOICES: usize = 6;

/// Fallback tempo in beats per minute.
pub const DEFAULT_TEMPO: u16 = 120;

/// Pending SOUND requests beyond this are dropped.
pub const SFX_QUEUE_DEPTH: usize = 8;

/// An instrument preset: waveform bits for the SID control register plus
/// envelope and pulse width.
#[derive(Clone, Copy)]
pub struct Instrument {
    pub ctrl: u8,
    pub ad: u8,
    pub sr: u8,
    pub pulse_width: u16,
}

/// The 16 factory instrument slots selected by `In`.
pub static INSTRUMENTS: [Instrument; 16] = [
    Instrument { ctrl: CTRL_PULSE, ad: 0x19, sr: 0xB6, pulse_width: 0x800 }, // 0 square lead
    Instrument { ctrl: CTRL_PULSE, ad: 0x0A, sr: 0x07, pulse_width: 0x600 }, // 1 piano
    Instrument { ctrl: CTRL_TRI, ad: 0x11, sr: 0xF4, pulse_width: 0x800 },   // 2 organ
    Instrument { ctrl: CTRL_SAW, ad: 0x59, sr: 0xB7, pulse_width: 0x800 },   // 3 strings
    Instrument { ctrl: CTRL_TRI, ad: 0x09, sr: 0x97, pulse_width: 0x800 },   // 4 bass
    Instrument { ctrl: CTRL_SAW, ad: 0x39, sr: 0xA7, pulse_width: 0x800 },   // 5 brass
    Instrument { ctrl: CTRL_TRI, ad: 0x49, sr: 0xC6, pulse_width: 0x800 },   // 6 flute
    Instrument { ctrl: CTRL_TRI, ad: 0x0B, sr: 0x09, pulse_width: 0x800 },   // 7 bell
    Instrument { ctrl: CTRL_SAW, ad: 0x0A, sr: 0x06, pulse_width: 0x800 },   // 8 guitar
    Instrument { ctrl: CTRL_TRI, ad: 0x09, sr: 0x00, pulse_width: 0x800 },   // 9 xylophone
    Instrument { ctrl: CTRL_PULSE, ad: 0x38, sr: 0xD6, pulse_width: 0x200 }, // 10 accordion
    Instrument { ctrl: CTRL_PULSE, ad: 0x09, sr: 0x25, pulse_width: 0x100 }, // 11 harpsichord
    Instrument { ctrl: CTRL_SAW, ad: 0x89, sr: 0xC8, pulse_width: 0x800 },   // 12 pad
    Instrument { ctrl: CTRL_PULSE, ad: 0x0A, sr: 0x38, pulse_width: 0x400 }, // 13 steel drum
    Instrument { ctrl: CTRL_NOISE, ad: 0x09, sr: 0x45, pulse_width: 0x800 }, // 14 snare
    Instrument { ctrl: CTRL_NOISE, ad: 0x08, sr: 0x04, pulse_width: 0x800 }, // 15 noise hit
];

/// Quarter-period sine, 32 steps, scaled to +/-63, for vibrato.
const SINE: [i8; 32] = [
    0, 12, 24, 35, 45, 52, 58, 62, 63, 62, 58, 52, 45, 35, 24, 12, 0, -12, -24, -35, -45, -52,
    -58, -62, -63, -62, -58, -52, -45, -35, -24, -12,
];

/// Convert an absolute semitone (A4 = 57 = 440 Hz) into a SID frequency
/// register value.
fn sid_freq(semitone: u8) -> f32 {
    let hz = 440.0 * ((semitone as f32 - 57.0) / 12.0).exp2();
    hz * 16_777_216.0 / SID_CLOCK_HZ as f32
}

#[derive(Clone)]
struct Arp {
    semitones: Vec<u8>,
    index: usize,
}

/// One voice's sequencing and effect state.
#[derive(Clone)]
struct VoiceState {
    parser: Option<MmlParser>,
    instrument: u8,
    note_ticks: u32,
    gate_open: bool,
    retrigger: bool,
    semitone: u8,
    current_freq: f32,
    target_freq: f32,
    portamento: bool,
    vibrato_depth: u8,
    vib_phase: u8,
    pulse_width: u16,
    pwm_sweep: i16,
    arp: Option<Arp>,
}

impl VoiceState {
    fn new() -> Self {
        Self {
            parser: None,
            instrument: 0,
            note_ticks: 0,
            gate_open: false,
            retrigger: false,
            semitone: 0,
            current_freq: 0.0,
            target_freq: 0.0,
            portamento: false,
            vibrato_depth: 0,
            vib_phase: 0,
            pulse_width: INSTRUMENTS[0].pulse_width,
            pwm_sweep: 0,
            arp: None,
        }
    }
}

/// Per-chip filter state driven by `@F` commands.
#[derive(Clone, Copy)]
struct ChipState {
    cutoff: u16,
    resonance: u8,
    mode: FilterMode,
    sweep: i16,
    routing: u8,
}

impl ChipState {
    fn new() -> Self {
        Self {
            cutoff: 1024,
            resonance: 0,
            mode: FilterMode::Off,
            sweep: 0,
            routing: 0,
        }
    }
}

/// A SOUND effect request: one note for a frame count on an instrument.
#[derive(Clone, Copy, Debug)]
pub struct SfxRequest {
    pub semitone: u8,
    pub frames: u16,
    pub instrument: u8,
}

struct ActiveSfx {
    remaining: u16,
    saved: VoiceState,
}

/// 6-voice MML sequencer with SFX voice stealing and per-frame effects.
///
/// The host (the BASIC interpreter) feeds MML text through [`play`] and
/// effect requests through [`sound`]; the board calls [`frame`] once per
/// video frame, which advances sequencing by `96 * BPM / 3600` ticks,
/// applies effects in a fixed order (arpeggio, PWM sweep, vibrato,
/// portamento, filter sweep) and pushes the resulting register values
/// into the two SID chips.
///
/// Status registers (`BA50-BA56`, read-only): offset 0 is the
/// active-voice bitmask; offsets 1-6 report each voice's sounding
/// semitone, 0 when silent.
///
/// [`play`]: MusicEngine::play
/// [`sound`]: MusicEngine::sound
/// [`frame`]: MusicEngine::frame
pub struct MusicEngine {
    voices: [VoiceState; VOICES],
    chips: [ChipState; 2],
    tempo: u16,
    tick_acc: u32,
    loop_enabled: bool,
    priority: [u8; VOICES],
    sfx: [Option<ActiveSfx>; VOICES],
    sfx_queue: VecDeque<SfxRequest>,
    wrote_last: bool,
}

impl MusicEngine {
    pub fn new() -> Self {
        Self {
            voices: std::array::from_fn(|_| VoiceState::new()),
            chips: [ChipState::new(); 2],
            tempo: DEFAULT_TEMPO,
            tick_acc: 0,
            loop_enabled: false,
            // Voice numbers, steal order: index 0 is stolen first.
            priority: [6, 5, 4, 3, 2, 1],
            sfx: std::array::from_fn(|_| None),
            sfx_queue: VecDeque::new(),
            wrote_last: false,
        }
    }

    // --- Host API ---

    /// Start sequencing MML text on voice `v` (0-5). Replaces whatever the
    /// voice was doing, including an active sound effect.
    pub fn play(&mut self, v: usize, text: &str) {
        if v >= VOICES {
            return;
        }
        self.sfx[v] = None;
        let voice = &mut self.voices[v];
        *voice = VoiceState::new();
        voice.parser = Some(MmlParser::new(text));
    }

    /// Stop voice `v`, releasing its gate.
    pub fn stop(&mut self, v: usize) {
        if v >= VOICES {
            return;
        }
        self.sfx[v] = None;
        let voice = &mut self.voices[v];
        voice.parser = None;
        voice.gate_open = false;
        voice.arp = None;
        voice.note_ticks = 0;
    }

    pub fn stop_all(&mut self) {
        for v in 0..VOICES {
            self.stop(v);
        }
        self.sfx_queue.clear();
    }

    /// Queue a sound effect. The queue is bounded; overflow is dropped.
    pub fn sound(&mut self, request: SfxRequest) {
        if self.sfx_queue.len() >= SFX_QUEUE_DEPTH {
            debug!("sfx queue full, dropping request {request:?}");
            return;
        }
        self.sfx_queue.push_back(request);
    }

    /// Replace the voice-steal order. Entries are 1-based voice numbers;
    /// index 0 is stolen first.
    pub fn set_priority(&mut self, order: [u8; VOICES]) {
        self.priority = order;
    }

    /// Restart sequences from the top when they run out.
    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    pub fn voice_active(&self, v: usize) -> bool {
        self.voices[v].parser.is_some() || self.sfx[v].is_some()
    }

    /// Music status register byte (`BA50 + offset`).
    pub fn status_byte(&self, offset: u8) -> u8 {
        match offset {
            0 => (0..VOICES).fold(0, |mask, v| {
                mask | ((self.voice_active(v) as u8) << v)
            }),
            1..=6 => {
                let voice = &self.voices[offset as usize - 1];
                if voice.gate_open { voice.semitone } else { 0 }
            }
            _ => 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // --- Frame tick ---

    /// Advance the engine by one 60 Hz frame and drive the SID registers.
    pub fn frame(&mut self, sids: &mut [Sid; 2]) {
        self.dispatch_sfx();

        // ticks_per_frame = 96 * BPM / 3600, accumulated without drift.
        self.tick_acc += 96 * self.tempo as u32;
        while self.tick_acc >= 3600 {
            self.tick_acc -= 3600;
            for v in 0..VOICES {
                if self.sfx[v].is_none() {
                    self.advance_tick(v);
                }
            }
        }

        self.apply_effects();

        let active = (0..VOICES).any(|v| self.voice_active(v) || self.voices[v].gate_open);
        if active {
            self.write_registers(sids);
            self.wrote_last = true;
        } else if self.wrote_last {
            // One trailing write releases every gate, then the engine
            // leaves the chips alone for direct CPU programming.
            self.write_registers(sids);
            self.wrote_last = false;
        }

        self.finish_sfx();
    }

    /// Consume sequencer commands until the voice owns a timed event.
    fn advance_tick(&mut self, v: usize) {
        if self.voices[v].note_ticks > 0 {
            self.voices[v].note_ticks -= 1;
            if self.voices[v].note_ticks > 0 {
                return;
            }
        }
        let mut rewound = false;
        while self.voices[v].note_ticks == 0 {
            let event = match self.voices[v].parser.as_mut() {
                Some(parser) => parser.next_event(),
                None => {
                    self.voices[v].gate_open = false;
                    return;
                }
            };
            match event {
                Some(event) => self.apply_event(v, event),
                None if self.loop_enabled && !rewound => {
                    rewound = true;
                    if let Some(parser) = self.voices[v].parser.as_mut() {
                        parser.rewind();
                    }
                }
                None => {
                    self.voices[v].parser = None;
                    self.voices[v].gate_open = false;
                    return;
                }
            }
        }
    }

    fn apply_event(&mut self, v: usize, event: MmlEvent) {
        match event {
            MmlEvent::Note {
                semitone,
                ticks,
                portamento,
            } => {
                let target = sid_freq(semitone);
                let voice = &mut self.voices[v];
                voice.semitone = semitone;
                voice.note_ticks = ticks;
                voice.arp = None;
                voice.portamento = portamento && voice.current_freq > 0.0;
                voice.target_freq = target;
                if !voice.portamento {
                    voice.current_freq = target;
                }
                voice.gate_open = true;
                voice.retrigger = true;
            }
            MmlEvent::Rest { ticks } => {
                let voice = &mut self.voices[v];
                voice.note_ticks = ticks;
                voice.gate_open = false;
                voice.arp = None;
            }
            MmlEvent::Arpeggio { semitones, ticks } => {
                let first = semitones[0];
                let voice = &mut self.voices[v];
                voice.note_ticks = ticks;
                voice.semitone = first;
                voice.current_freq = sid_freq(first);
                voice.target_freq = voice.current_freq;
                voice.portamento = false;
                voice.gate_open = true;
                voice.retrigger = true;
                voice.arp = Some(Arp {
                    semitones,
                    index: 0,
                });
            }
            // Tempo is global; the last write from any voice wins.
            MmlEvent::Tempo(bpm) => self.tempo = bpm,
            MmlEvent::Instrument(slot) => {
                let voice = &mut self.voices[v];
                voice.instrument = slot;
                voice.pulse_width = INSTRUMENTS[slot as usize & 0x0F].pulse_width;
            }
            MmlEvent::Vibrato(depth) => self.voices[v].vibrato_depth = depth,
            MmlEvent::PulseWidth(width) => self.voices[v].pulse_width = width,
            MmlEvent::PwmSweep(step) => self.voices[v].pwm_sweep = step,
            MmlEvent::FilterCutoff { cutoff, resonance } => {
                let chip = &mut self.chips[v / 3];
                chip.cutoff = cutoff;
                if let Some(r) = resonance {
                    chip.resonance = r;
                }
                chip.routing |= 1 << (v % 3);
            }
            MmlEvent::FilterMode(mode) => self.chips[v / 3].mode = mode,
            MmlEvent::FilterSweep(step) => self.chips[v / 3].sweep = step,
        }
    }

    /// Fixed per-frame effect order: arpeggio, PWM sweep, vibrato phase,
    /// portamento slide, filter sweep.
    fn apply_effects(&mut self) {
        for voice in &mut self.voices {
            if let Some(arp) = &mut voice.arp
                && voice.gate_open
            {
                arp.index = (arp.index + 1) % arp.semitones.len();
                let semitone = arp.semitones[arp.index];
                voice.semitone = semitone;
                voice.current_freq = sid_freq(semitone);
                voice.target_freq = voice.current_freq;
            }
            if voice.pwm_sweep != 0 {
                voice.pulse_width =
                    (voice.pulse_width as i32 + voice.pwm_sweep as i32).clamp(0, 4095) as u16;
            }
            if voice.vibrato_depth > 0 {
                voice.vib_phase = voice.vib_phase.wrapping_add(12);
            }
            if voice.portamento {
                let diff = voice.target_freq - voice.current_freq;
                if diff.abs() <= 2.0 {
                    voice.current_freq = voice.target_freq;
                    voice.portamento = false;
                } else {
                    // One eighth of the remaining distance per frame.
                    voice.current_freq += diff / 8.0;
                }
            }
        }
        for chip in &mut self.chips {
            if chip.sweep != 0 {
                chip.cutoff = (chip.cutoff as i32 + chip.sweep as i32).clamp(0, 2047) as u16;
            }
        }
    }

    fn write_registers(&mut self, sids: &mut [Sid; 2]) {
        for v in 0..VOICES {
            let voice = &mut self.voices[v];
            let inst = &INSTRUMENTS[voice.instrument as usize & 0x0F];
            let base = ((v % 3) * 7) as u8;
            let sid = &mut sids[v / 3];

            let vibrato = if voice.vibrato_depth > 0 {
                let sine = SINE[(voice.vib_phase >> 3) as usize & 31] as f32 / 63.0;
                voice.current_freq * voice.vibrato_depth as f32 / 512.0 * sine
            } else {
                0.0
            };
            let freq = (voice.current_freq + vibrato).clamp(0.0, 65535.0) as u16;

            sid.write(base, freq as u8);
            sid.write(base + 1, (freq >> 8) as u8);
            sid.write(base + 2, voice.pulse_width as u8);
            sid.write(base + 3, (voice.pulse_width >> 8) as u8);
            let wave = inst.ctrl & 0xF0;
            if voice.retrigger {
                sid.write(base + 5, inst.ad);
                sid.write(base + 6, inst.sr);
                // Drop the gate for an instant so the envelope retriggers.
                sid.write(base + 4, wave);
                voice.retrigger = false;
            }
            sid.write(base + 4, wave | if voice.gate_open { CTRL_GATE } else { 0 });
        }
        for (c, chip) in self.chips.iter().enumerate() {
            let sid = &mut sids[c];
            sid.write(0x15, (chip.cutoff & 0x07) as u8);
            sid.write(0x16, (chip.cutoff >> 3) as u8);
            sid.write(0x17, (chip.resonance << 4) | (chip.routing & 0x07));
            let mode = match chip.mode {
                FilterMode::Low => 0x10,
                FilterMode::Band => 0x20,
                FilterMode::High => 0x40,
                FilterMode::Off => 0x00,
            };
            sid.write(0x18, mode | 0x0F);
        }
    }

    // --- SFX voice stealing ---

    fn dispatch_sfx(&mut self) {
        while let Some(&request) = self.sfx_queue.front() {
            let Some(v) = self.pick_voice() else {
                break;
            };
            self.sfx_queue.pop_front();
            let saved = self.voices[v].clone();
            let voice = &mut self.voices[v];
            voice.parser = None;
            voice.instrument = request.instrument & 0x0F;
            voice.pulse_width = INSTRUMENTS[voice.instrument as usize].pulse_width;
            voice.semitone = request.semitone;
            voice.current_freq = sid_freq(request.semitone);
            voice.target_freq = voice.current_freq;
            voice.portamento = false;
            voice.arp = None;
            voice.note_ticks = 0;
            voice.gate_open = true;
            voice.retrigger = true;
            self.sfx[v] = Some(ActiveSfx {
                remaining: request.frames.max(1),
                saved,
            });
        }
    }

    /// First fully idle voice, else the first priority-vector entry not
    /// already playing an effect. `None` when every voice runs an effect.
    fn pick_voice(&self) -> Option<usize> {
        (0..VOICES)
            .find(|&v| self.voices[v].parser.is_none() && self.sfx[v].is_none())
            .or_else(|| {
                self.priority.iter().find_map(|&number| {
                    let v = (number as usize).checked_sub(1)?;
                    (v < VOICES && self.sfx[v].is_none()).then_some(v)
                })
            })
    }

    fn finish_sfx(&mut self) {
        for v in 0..VOICES {
            if let Some(mut sfx) = self.sfx[v].take() {
                sfx.remaining = sfx.remaining.saturating_sub(1);
                if sfx.remaining == 0 {
                    // Restore the stolen voice exactly where it stopped.
                    let mut restored = sfx.saved;
                    restored.retrigger = restored.gate_open;
                    self.voices[v] = restored;
                } else {
                    self.sfx[v] = Some(sfx);
                }
            }
        }
    }
}

impl Default for MusicEngine {
    fn default() -> Self {
        Self::new()
    }
}
