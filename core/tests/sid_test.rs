use e6502_core::device::sid::{self, Sid};

/// Program voice `v` with a frequency, waveform, and envelope, then gate.
fn note_on(sid: &mut Sid, v: u8, freq: u16, wave: u8) {
    let base = v * 7;
    sid.write(base, freq as u8);
    sid.write(base + 1, (freq >> 8) as u8);
    sid.write(base + 2, 0x00);
    sid.write(base + 3, 0x08); // 50% pulse width
    sid.write(base + 5, 0x00); // instant attack
    sid.write(base + 6, 0xF0); // full sustain
    sid.write(base + 4, wave | sid::CTRL_GATE);
}

fn run(sid: &mut Sid, samples: usize) -> Vec<f32> {
    (0..samples).map(|_| sid.sample()).collect()
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

#[test]
fn test_registers_read_as_zero() {
    let mut sid = Sid::new();
    sid.write(0x00, 0xFF);
    sid.write(0x18, 0x0F);
    for reg in 0..sid::SID_REGS {
        assert_eq!(sid.read(reg), 0);
    }
}

#[test]
fn test_gated_voice_produces_sound() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x0F); // volume 15, filter off
    note_on(&mut sid, 0, 0x1CD6, sid::CTRL_SAW); // ~A4
    let samples = run(&mut sid, 4410);
    assert!(peak(&samples) > 0.05, "expected audible output");
}

#[test]
fn test_zero_volume_is_silent() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x00);
    note_on(&mut sid, 0, 0x1CD6, sid::CTRL_SAW);
    let samples = run(&mut sid, 2000);
    assert_eq!(peak(&samples), 0.0);
}

#[test]
fn test_ungated_voice_stays_silent() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x0F);
    let base = 0;
    sid.write(base, 0xD6);
    sid.write(base + 1, 0x1C);
    sid.write(base + 4, sid::CTRL_SAW); // waveform but no gate
    let samples = run(&mut sid, 2000);
    assert_eq!(peak(&samples), 0.0);
}

#[test]
fn test_release_decays_to_silence() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x0F);
    note_on(&mut sid, 0, 0x1CD6, sid::CTRL_TRI);
    run(&mut sid, 2000);
    // Gate off with the fastest release.
    sid.write(0x06, 0xF0);
    sid.write(0x04, sid::CTRL_TRI);
    // 6 ms of release at 44.1 kHz is under 300 samples; give it room.
    run(&mut sid, 2000);
    assert_eq!(sid.envelope_level(0), 0);
    let tail = run(&mut sid, 500);
    assert_eq!(peak(&tail), 0.0);
}

#[test]
fn test_envelope_attack_reaches_full_scale() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x0F);
    note_on(&mut sid, 0, 0x1CD6, sid::CTRL_TRI);
    run(&mut sid, 1000);
    // Attack 0 (2 ms) with sustain 15 holds at the top.
    assert!(sid.envelope_level(0) > 240);
}

#[test]
fn test_noise_output_varies() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x0F);
    note_on(&mut sid, 0, 0x4000, sid::CTRL_NOISE);
    let samples = run(&mut sid, 4410);
    let distinct = samples
        .iter()
        .map(|s| (s * 1000.0) as i32)
        .collect::<std::collections::HashSet<_>>();
    assert!(distinct.len() > 10, "noise should not be periodic-flat");
}

#[test]
fn test_test_bit_holds_oscillator() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x0F);
    note_on(&mut sid, 0, 0x1CD6, sid::CTRL_SAW);
    // TEST freezes the accumulator at zero: sawtooth output pins low.
    sid.write(0x04, sid::CTRL_SAW | sid::CTRL_TEST | sid::CTRL_GATE);
    run(&mut sid, 100);
    let samples = run(&mut sid, 100);
    assert!(samples.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_voices_mix() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x0F);
    note_on(&mut sid, 0, 0x1CD6, sid::CTRL_TRI);
    let solo = peak(&run(&mut sid, 4410));

    let mut sid = Sid::new();
    sid.write(0x18, 0x0F);
    note_on(&mut sid, 0, 0x1CD6, sid::CTRL_TRI);
    note_on(&mut sid, 1, 0x0E6B, sid::CTRL_TRI);
    note_on(&mut sid, 2, 0x2673, sid::CTRL_TRI);
    let trio = peak(&run(&mut sid, 4410));
    assert!(trio > solo);
}

#[test]
fn test_filter_routing_changes_output() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x1F); // low-pass + volume 15
    sid.write(0x15, 0x00);
    sid.write(0x16, 0x04); // very low cutoff
    sid.write(0x17, 0x01); // route voice 1
    note_on(&mut sid, 0, 0x4000, sid::CTRL_SAW);
    let filtered = peak(&run(&mut sid, 4410));

    let mut sid = Sid::new();
    sid.write(0x18, 0x0F); // no filter
    note_on(&mut sid, 0, 0x4000, sid::CTRL_SAW);
    let dry = peak(&run(&mut sid, 4410));

    // A heavy low-pass on a bright saw removes energy.
    assert!(filtered < dry);
}

#[test]
fn test_reset_silences_chip() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x0F);
    note_on(&mut sid, 0, 0x1CD6, sid::CTRL_SAW);
    run(&mut sid, 1000);
    sid.reset();
    let samples = run(&mut sid, 1000);
    assert_eq!(peak(&samples), 0.0);
}
