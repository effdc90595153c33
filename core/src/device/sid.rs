/// SID — 3-voice synthesizer chip (digital approximation)
///
/// Two instances cover the machine's six voices: SID1 at `D400` (voices
/// 1-3) and SID2 at `D420` (voices 4-6). Registers are write-only from the
/// CPU side; reads of the register ranges return 0.
///
/// # Write registers (offsets 0x00-0x18, 7 bytes per voice)
///
/// | Offset      | Name    | Description                                |
/// |-------------|---------|--------------------------------------------|
/// | 0x00 + 7v   | FREQ_LO | Oscillator frequency, low byte             |
/// | 0x01 + 7v   | FREQ_HI | Oscillator frequency, high byte            |
/// | 0x02 + 7v   | PW_LO   | Pulse width, low byte                      |
/// | 0x03 + 7v   | PW_HI   | Pulse width, bits 8-11                     |
/// | 0x04 + 7v   | CTRL    | Gate, sync, ring, test, waveform bits      |
/// | 0x05 + 7v   | AD      | Attack (bits 7:4) / decay (bits 3:0)       |
/// | 0x06 + 7v   | SR      | Sustain (bits 7:4) / release (bits 3:0)    |
/// | 0x15        | FC_LO   | Filter cutoff, low 3 bits                  |
/// | 0x16        | FC_HI   | Filter cutoff, bits 3-10                   |
/// | 0x17        | RES_FILT| Resonance (bits 7:4) / voice routing (2:0) |
/// | 0x18        | MODE_VOL| Filter mode (bits 6:4), 3OFF (7), volume   |
///
/// # CTRL bit assignments
///
/// | Bit | Name  | Description                                        |
/// |-----|-------|----------------------------------------------------|
/// | 0   | GATE  | Envelope gate: 0->1 attack, 1->0 release           |
/// | 1   | SYNC  | Hard-sync to the previous voice's oscillator       |
/// | 2   | RING  | Ring-modulate triangle with the previous voice     |
/// | 3   | TEST  | Hold the oscillator at zero                        |
/// | 4   | TRI   | Triangle waveform                                  |
/// | 5   | SAW   | Sawtooth waveform                                  |
/// | 6   | PULSE | Pulse waveform (width from PW registers)           |
/// | 7   | NOISE | LFSR noise waveform                                |
///
/// # Synthesis model
///
/// Each voice owns a 24-bit phase accumulator advanced by
/// `freq * clock / sample_rate` once per output sample at 44 100 Hz
/// against a 985 248 Hz chip clock. Waveform bits read 12-bit samples out
/// of the accumulator; multiple selected waveforms AND together. The ADSR
/// envelope (attack table 2 ms-8 s, decay/release three times slower)
/// scales the waveform to a 0-255 level. The three voices sum through a
/// Chamberlin state-variable filter (low/band/high-pass per MODE bits,
/// cutoff 0-2047, resonance 0-15, per-voice routing) and the result scales
/// by the volume nibble. This is a listening approximation, not a
/// cycle-exact model of the analog chip.
pub struct Sid {
    voices: [Voice; 3],
    fc: u16,
    res_filt: u8,
    mode_vol: u8,
    filter_low: f32,
    filter_band: f32,
    cycles_per_sample: u32, // 16.16 fixed point
    sample_rate: u32,
}

/// PAL chip clock driving the oscillators.
pub const SID_CLOCK_HZ: u32 = 985_248;

/// Host output sample rate.
pub const SAMPLE_RATE: u32 = 44_100;

/// Register count per chip (`D400-D41C`).
pub const SID_REGS: u8 = 0x1D;

// CTRL bit positions.
pub const CTRL_GATE: u8 = 0x01;
pub const CTRL_SYNC: u8 = 0x02;
pub const CTRL_RING: u8 = 0x04;
pub const CTRL_TEST: u8 = 0x08;
pub const CTRL_TRI: u8 = 0x10;
pub const CTRL_SAW: u8 = 0x20;
pub const CTRL_PULSE: u8 = 0x40;
pub const CTRL_NOISE: u8 = 0x80;

// MODE_VOL bit positions.
const MODE_LP: u8 = 0x10;
const MODE_BP: u8 = 0x20;
const MODE_HP: u8 = 0x40;
const MODE_3OFF: u8 = 0x80;

/// Attack times in milliseconds, indexed by the 4-bit rate nibble.
/// Decay and release run three times slower.
const ATTACK_MS: [u32; 16] = [
    2, 8, 16, 24, 38, 56, 68, 80, 100, 250, 500, 800, 1000, 3000, 5000, 8000,
];

#[derive(Clone, Copy, PartialEq, Debug)]
enum EnvStage {
    Attack,
    Decay,
    Sustain,
    Release,
    Idle,
}

#[derive(Clone, Copy)]
struct Envelope {
    stage: EnvStage,
    level: f32, // 0.0 - 255.0
}

impl Envelope {
    fn new() -> Self {
        Self {
            stage: EnvStage::Idle,
            level: 0.0,
        }
    }

    fn gate_on(&mut self) {
        self.stage = EnvStage::Attack;
    }

    fn gate_off(&mut self) {
        if self.stage != EnvStage::Idle {
            self.stage = EnvStage::Release;
        }
    }

    /// Level change per sample for a rate nibble over `ms` milliseconds of
    /// full-scale travel.
    fn rate_step(ms: u32, sample_rate: u32) -> f32 {
        255.0 / (ms as f32 * sample_rate as f32 / 1000.0)
    }

    fn step(&mut self, ad: u8, sr: u8, sample_rate: u32) {
        match self.stage {
            EnvStage::Attack => {
                self.level += Self::rate_step(ATTACK_MS[(ad >> 4) as usize], sample_rate);
                if self.level >= 255.0 {
                    self.level = 255.0;
                    self.stage = EnvStage::Decay;
                }
            }
            EnvStage::Decay => {
                let sustain = (sr >> 4) as f32 * 17.0;
                self.level -= Self::rate_step(3 * ATTACK_MS[(ad & 0x0F) as usize], sample_rate);
                if self.level <= sustain {
                    self.level = sustain;
                    self.stage = EnvStage::Sustain;
                }
            }
            EnvStage::Sustain => {
                // A lowered sustain register pulls the level down at the
                // decay rate; it never rises without a new gate.
                let sustain = (sr >> 4) as f32 * 17.0;
                if self.level > sustain {
                    self.stage = EnvStage::Decay;
                }
            }
            EnvStage::Release => {
                self.level -= Self::rate_step(3 * ATTACK_MS[(sr & 0x0F) as usize], sample_rate);
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = EnvStage::Idle;
                }
            }
            EnvStage::Idle => {}
        }
    }
}

#[derive(Clone, Copy)]
struct Voice {
    freq: u16,
    pw: u16,
    ctrl: u8,
    ad: u8,
    sr: u8,
    acc: u32,  // 24-bit phase accumulator
    lfsr: u32, // 23-bit noise shift register
    env: Envelope,
}

impl Voice {
    fn new() -> Self {
        Self {
            freq: 0,
            pw: 0,
            ctrl: 0,
            ad: 0,
            sr: 0,
            acc: 0,
            lfsr: 0x7F_FFF8,
            env: Envelope::new(),
        }
    }

    fn set_ctrl(&mut self, value: u8) {
        let was_gated = self.ctrl & CTRL_GATE != 0;
        let gated = value & CTRL_GATE != 0;
        if !was_gated && gated {
            self.env.gate_on();
        } else if was_gated && !gated {
            self.env.gate_off();
        }
        if value & CTRL_TEST != 0 {
            self.acc = 0;
            self.lfsr = 0x7F_FFF8;
        }
        self.ctrl = value;
    }

    /// Advance the noise LFSR one step: feedback = bit 22 XOR bit 17.
    fn clock_noise(&mut self) {
        let bit = ((self.lfsr >> 22) ^ (self.lfsr >> 17)) & 1;
        self.lfsr = ((self.lfsr << 1) | bit) & 0x7F_FFFF;
    }

    /// Noise output: eight tap bits of the shift register widened to 12
    /// bits.
    fn noise_wave(&self) -> u16 {
        let b = |n: u32| ((self.lfsr >> n) & 1) as u16;
        (b(22) << 11)
            | (b(20) << 10)
            | (b(16) << 9)
            | (b(13) << 8)
            | (b(11) << 7)
            | (b(7) << 6)
            | (b(4) << 5)
            | (b(2) << 4)
    }

    /// 12-bit waveform sample. Selected waveform outputs AND together;
    /// with no waveform selected the oscillator idles at mid-scale.
    fn wave(&self, prev_acc: u32) -> u16 {
        if self.ctrl & 0xF0 == 0 {
            return 0x800;
        }
        let mut out = 0xFFF;
        if self.ctrl & CTRL_TRI != 0 {
            let ring_mask = if self.ctrl & CTRL_RING != 0 {
                prev_acc & 0x80_0000
            } else {
                0
            };
            let t = self.acc ^ ring_mask;
            let t = if t & 0x80_0000 != 0 { !t } else { t };
            out &= ((t >> 11) & 0xFFF) as u16;
        }
        if self.ctrl & CTRL_SAW != 0 {
            out &= (self.acc >> 12) as u16;
        }
        if self.ctrl & CTRL_PULSE != 0 {
            out &= if (self.acc >> 12) as u16 >= (self.pw & 0x0FFF) {
                0xFFF
            } else {
                0
            };
        }
        if self.ctrl & CTRL_NOISE != 0 {
            out &= self.noise_wave();
        }
        out
    }
}

impl Sid {
    pub fn new() -> Self {
        Self::with_sample_rate(SAMPLE_RATE)
    }

    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            voices: [Voice::new(); 3],
            fc: 0,
            res_filt: 0,
            mode_vol: 0,
            filter_low: 0.0,
            filter_band: 0.0,
            cycles_per_sample: (((SID_CLOCK_HZ as u64) << 16) / sample_rate as u64) as u32,
            sample_rate,
        }
    }

    /// Write a register (offset 0x00-0x1C). Out-of-range offsets are
    /// ignored.
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg {
            0x00..=0x14 => {
                let voice = &mut self.voices[(reg / 7) as usize];
                match reg % 7 {
                    0 => voice.freq = (voice.freq & 0xFF00) | value as u16,
                    1 => voice.freq = (voice.freq & 0x00FF) | ((value as u16) << 8),
                    2 => voice.pw = (voice.pw & 0x0F00) | value as u16,
                    3 => voice.pw = (voice.pw & 0x00FF) | (((value & 0x0F) as u16) << 8),
                    4 => voice.set_ctrl(value),
                    5 => voice.ad = value,
                    _ => voice.sr = value,
                }
            }
            0x15 => self.fc = (self.fc & 0x7F8) | (value & 0x07) as u16,
            0x16 => self.fc = (self.fc & 0x007) | ((value as u16) << 3),
            0x17 => self.res_filt = value,
            0x18 => self.mode_vol = value,
            _ => {}
        }
    }

    /// CPU-side read: the register file is write-only and reads as 0.
    pub fn read(&self, _reg: u8) -> u8 {
        0
    }

    /// Generate one mono sample in [-1.0, 1.0].
    pub fn sample(&mut self) -> f32 {
        // Advance all oscillators, then apply hard sync from the previous
        // voice's new accumulator state (voice 0 syncs to voice 2).
        let old: [u32; 3] = [self.voices[0].acc, self.voices[1].acc, self.voices[2].acc];
        let mut new = [0u32; 3];
        for (v, voice) in self.voices.iter().enumerate() {
            if voice.ctrl & CTRL_TEST != 0 {
                new[v] = 0;
                continue;
            }
            let advance = ((voice.freq as u64 * self.cycles_per_sample as u64) >> 16) as u32;
            new[v] = (old[v] + advance) & 0xFF_FFFF;
        }
        for v in 0..3 {
            let src = (v + 2) % 3;
            let src_rose = old[src] & 0x80_0000 == 0 && new[src] & 0x80_0000 != 0;
            if self.voices[v].ctrl & CTRL_SYNC != 0 && src_rose {
                new[v] = 0;
            }
        }
        for (v, voice) in self.voices.iter_mut().enumerate() {
            // Noise clocks on accumulator bit 19 rising.
            if old[v] & 0x08_0000 == 0 && new[v] & 0x08_0000 != 0 {
                voice.clock_noise();
            }
            voice.acc = new[v];
        }

        let mut direct = 0.0f32;
        let mut filtered = 0.0f32;
        for v in 0..3 {
            let prev_acc = self.voices[(v + 2) % 3].acc;
            let voice = &mut self.voices[v];
            voice.env.step(voice.ad, voice.sr, self.sample_rate);
            let routed = self.res_filt & (1 << v) != 0;
            if v == 2 && self.mode_vol & MODE_3OFF != 0 && !routed {
                continue;
            }
            let wave = voice.wave(prev_acc);
            let out = (wave as f32 - 2048.0) / 2048.0 * (voice.env.level / 255.0);
            if routed {
                filtered += out;
            } else {
                direct += out;
            }
        }

        let mixed = direct + self.run_filter(filtered);
        let volume = (self.mode_vol & 0x0F) as f32 / 15.0;
        mixed * volume / 3.0
    }

    /// Chamberlin state-variable filter; cutoff and resonance map from the
    /// register values, outputs mix per the MODE bits.
    fn run_filter(&mut self, input: f32) -> f32 {
        if self.mode_vol & (MODE_LP | MODE_BP | MODE_HP) == 0 {
            return input;
        }
        let cutoff_hz = 30.0 + self.fc as f32 * 5.8;
        let f = (2.0 * (std::f32::consts::PI * cutoff_hz / self.sample_rate as f32).sin()).min(1.0);
        let damping = 1.0 - 0.9 * ((self.res_filt >> 4) as f32 / 15.0);

        let high = input - self.filter_low - damping * self.filter_band;
        self.filter_band += f * high;
        self.filter_low += f * self.filter_band;

        let mut out = 0.0;
        if self.mode_vol & MODE_LP != 0 {
            out += self.filter_low;
        }
        if self.mode_vol & MODE_BP != 0 {
            out += self.filter_band;
        }
        if self.mode_vol & MODE_HP != 0 {
            out += high;
        }
        out
    }

    /// Silence the chip and clear all voice state.
    pub fn reset(&mut self) {
        let rate = self.sample_rate;
        *self = Self::with_sample_rate(rate);
    }

    /// Current envelope level of a voice, 0-255. Inspection only.
    pub fn envelope_level(&self, voice: usize) -> u8 {
        self.voices[voice].env.level as u8
    }
}

impl Default for Sid {
    fn default() -> Self {
        Self::new()
    }
}
