use e6502_core::device::music::{MusicEngine, SfxRequest};
use e6502_core::device::sid::Sid;

fn sids() -> [Sid; 2] {
    [Sid::new(), Sid::new()]
}

/// Frames until voice `v` goes silent, bounded by `limit`.
fn frames_until_silent(engine: &mut MusicEngine, sids: &mut [Sid; 2], v: usize, limit: u32) -> u32 {
    for frame in 0..limit {
        if !engine.voice_active(v) {
            return frame;
        }
        engine.frame(sids);
    }
    limit
}

#[test]
fn test_quarter_note_duration_at_default_tempo() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.play(0, "c4");
    // 96 ticks at 96*120/3600 = 3.2 ticks per frame: 30 frames.
    let frames = frames_until_silent(&mut engine, &mut sids, 0, 100);
    assert!((29..=31).contains(&frames), "got {frames} frames");
}

#[test]
fn test_tempo_change_scales_duration() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.play(0, "t240 c4");
    // Twice the tempo: 15 frames for a quarter note.
    let frames = frames_until_silent(&mut engine, &mut sids, 0, 100);
    assert!((14..=16).contains(&frames), "got {frames} frames");
    assert_eq!(engine.tempo(), 240);
}

#[test]
fn test_tempo_is_global_last_write_wins() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.play(0, "t100 c1");
    engine.play(1, "t180 c1");
    engine.frame(&mut sids);
    assert_eq!(engine.tempo(), 180);
}

#[test]
fn test_status_reports_active_voices_and_notes() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.play(0, "o4 c1");
    engine.play(3, "o5 e1");
    engine.frame(&mut sids);

    assert_eq!(engine.status_byte(0), 0b0000_1001);
    assert_eq!(engine.status_byte(1), 48); // C-4
    assert_eq!(engine.status_byte(2), 0);
    assert_eq!(engine.status_byte(4), 64); // E-5
}

#[test]
fn test_rest_reports_silent_voice() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.play(0, "r1");
    engine.frame(&mut sids);
    assert!(engine.voice_active(0));
    assert_eq!(engine.status_byte(1), 0);
}

#[test]
fn test_sequence_ends_and_voice_goes_idle() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.play(0, "c32");
    let frames = frames_until_silent(&mut engine, &mut sids, 0, 100);
    assert!(frames < 10);
    assert_eq!(engine.status_byte(0), 0);
}

#[test]
fn test_loop_mode_restarts_sequence() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.set_loop(true);
    engine.play(0, "c4");
    for _ in 0..120 {
        engine.frame(&mut sids);
    }
    assert!(engine.voice_active(0));
}

#[test]
fn test_sfx_takes_first_idle_voice() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.sound(SfxRequest {
        semitone: 72,
        frames: 5,
        instrument: 0,
    });
    engine.frame(&mut sids);
    assert!(engine.voice_active(0));
    assert_eq!(engine.status_byte(1), 72);

    for _ in 0..6 {
        engine.frame(&mut sids);
    }
    assert!(!engine.voice_active(0));
}

#[test]
fn test_sfx_steals_lowest_priority_voice_and_restores() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    for v in 0..6 {
        engine.play(v, "o4 c1 c1 c1");
    }
    engine.frame(&mut sids);
    assert_eq!(engine.status_byte(6), 48);

    // All voices busy: the default priority vector sacrifices voice 6.
    engine.sound(SfxRequest {
        semitone: 84,
        frames: 4,
        instrument: 1,
    });
    engine.frame(&mut sids);
    assert_eq!(engine.status_byte(6), 84);
    // The other voices keep playing music.
    assert_eq!(engine.status_byte(1), 48);

    for _ in 0..5 {
        engine.frame(&mut sids);
    }
    // The stolen voice resumed its sequence where it stopped.
    assert_eq!(engine.status_byte(6), 48);
    assert!(engine.voice_active(5));
}

#[test]
fn test_sfx_queue_is_bounded() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    for v in 0..6 {
        engine.play(v, "c1");
    }
    // Six effects occupy all voices; two queue; the rest drop.
    for _ in 0..20 {
        engine.sound(SfxRequest {
            semitone: 60,
            frames: 2,
            instrument: 0,
        });
    }
    engine.frame(&mut sids);
    for v in 0..6 {
        assert!(engine.voice_active(v));
    }
}

#[test]
fn test_custom_priority_order() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.set_priority([1, 2, 3, 4, 5, 6]);
    for v in 0..6 {
        engine.play(v, "o4 c1");
    }
    engine.frame(&mut sids);
    engine.sound(SfxRequest {
        semitone: 84,
        frames: 3,
        instrument: 0,
    });
    engine.frame(&mut sids);
    // Voice 1 (index 0) is now the first to be stolen.
    assert_eq!(engine.status_byte(1), 84);
    assert_eq!(engine.status_byte(6), 48);
}

#[test]
fn test_stop_all_silences_engine() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    for v in 0..6 {
        engine.play(v, "c1");
    }
    engine.frame(&mut sids);
    engine.stop_all();
    assert_eq!(engine.status_byte(0), 0);
}

#[test]
fn test_arpeggio_cycles_per_frame() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.play(0, "{c e g}1");
    engine.frame(&mut sids);
    let first = engine.status_byte(1);
    engine.frame(&mut sids);
    let second = engine.status_byte(1);
    engine.frame(&mut sids);
    let third = engine.status_byte(1);
    assert_ne!(first, second);
    assert_ne!(second, third);
    assert!([48u8, 52, 55].contains(&first));
    assert!([48u8, 52, 55].contains(&second));
    assert!([48u8, 52, 55].contains(&third));
}

#[test]
fn test_whole_note_with_tie_spans_two_bars() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.play(0, "c1&c1");
    // Two tied whole notes: 768 ticks = 240 frames at tempo 120.
    let frames = frames_until_silent(&mut engine, &mut sids, 0, 300);
    assert!((238..=242).contains(&frames), "got {frames} frames");
}

#[test]
fn test_engine_drives_sid_gate() {
    let mut engine = MusicEngine::new();
    let mut sids = sids();
    engine.play(0, "t120 o4 c1");
    engine.frame(&mut sids);
    // The gated voice must produce audio out of SID1.
    let peak = (0..4410)
        .map(|_| sids[0].sample().abs())
        .fold(0.0f32, f32::max);
    assert!(peak > 0.01, "engine should open the gate, peak {peak}");
}
