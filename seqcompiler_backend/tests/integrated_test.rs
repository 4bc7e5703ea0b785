use assert_approx_eq::assert_approx_eq;
use std::sync::Arc;

use seqcompiler_backend::*;

const SETUP: &str = r#"
[clock]
rate = 1e6

[novatech]
min_trigger_width = 100e-6

[ao_ch]
x = 0
y = 1
coil_sum = 9

[do_ch]
shutter = 3
img_trig = 20

[dds_ch]
cooling_freq = 0
repump_freq = 1
"#;

fn sequencer() -> Sequencer {
    let settings = Settings::from_toml_str(SETUP).unwrap();
    let channels = Arc::new(settings.channel_map().unwrap());
    Sequencer::new(channels, settings.sequencer_config()).unwrap()
}

#[test]
fn two_independent_analog_updates() {
    let mut seq = sequencer();
    assert_eq!(seq.update(1e-3, &[("x", 5.0)], &[], &[]), Ok(100));
    assert_eq!(seq.update(1e-3, &[("y", -5.0)], &[], &[]), Ok(1100));
    let program = seq.finish();
    let words = program.words();

    let (addr, v) = decode_analog(words[98]).unwrap();
    assert_eq!(addr, 0);
    assert_approx_eq!(v, 5.0, ANALOG_STEP);
    assert!(is_strobed(words[98]) && !is_strobed(words[99]));
    assert_eq!(payload(words[98]), words[99]);

    let (addr, v) = decode_analog(words[1098]).unwrap();
    assert_eq!(addr, 1);
    assert_approx_eq!(v, -5.0, ANALOG_STEP);

    assert_eq!(words[100], EPOCH_TRIGGER);
    assert_eq!(words[1100], EPOCH_TRIGGER);
    // Nothing else was written
    let written = words.iter().filter(|&&w| w != 0).count();
    assert_eq!(written, 6);
}

#[test]
fn decoded_analog_values_match_requested() {
    let mut seq = sequencer();
    let values = [-10.0, -3.3, 0.0, 0.25, 7.77, 10.0];
    let mut steps = Vec::new();
    for v in values {
        steps.push(seq.update(10e-6, &[("coil_sum", v)], &[], &[]).unwrap());
    }
    let words = seq.words();
    for (step, v) in steps.into_iter().zip(values) {
        let (addr, decoded) = decode_analog(words[step - 1]).unwrap();
        assert_eq!(addr, 9);
        assert!((decoded - v).abs() < ANALOG_STEP);
    }
}

#[test]
fn digital_update_roundtrip() {
    let mut seq = sequencer();
    let step = seq
        .update(1e-3, &[], &[("shutter", true), ("img_trig", true)], &[])
        .unwrap();
    let words = seq.words().to_vec();
    assert_eq!(decode_digital(&words[step - 6..step]), vec![3, 20]);

    let step = seq
        .update(1e-3, &[], &[("img_trig", false)], &[])
        .unwrap();
    let words = seq.words().to_vec();
    assert!(decode_digital(&words[step - 6..step]).is_empty());
}

#[test]
fn synthesizer_table_follows_updates() {
    let mut seq = sequencer();
    seq.update(
        1e-3,
        &[("x", 1.)],
        &[("shutter", true)],
        &[("cooling_freq", 80.0), ("repump_freq", 110.5)],
    )
    .unwrap();
    seq.update(1e-3, &[], &[], &[("cooling_freq", 82.25)]).unwrap();
    seq.update(1e-3, &[("x", 2.)], &[], &[]).unwrap();

    let program = seq.finish();
    assert_eq!(program.row_count(), 2);
    let rows = program.synth_rows();
    assert_eq!(rows.row(0).to_vec(), vec![80.0, 110.5, 0., 0.]);
    assert_eq!(rows.row(1).to_vec(), vec![82.25, 110.5, 0., 0.]);

    // One trigger window per row, each ending at its update's boundary
    let words = program.words();
    let flagged: Vec<usize> = (0..program.sample_count())
        .filter(|&i| words[i] & SYNTH_TRIGGER != 0)
        .collect();
    assert_eq!(flagged.len(), 200);
    assert_eq!(flagged[0], 0);
    assert_eq!(flagged[99], 99);
    assert_eq!(flagged[100], 1000);
    assert_eq!(flagged[199], 1099);
}

#[test]
fn synthesizer_updates_too_close_together() {
    let mut seq = sequencer();
    seq.update(50e-6, &[], &[], &[("cooling_freq", 80.0)]).unwrap();
    assert!(matches!(
        seq.update(1e-3, &[], &[], &[("repump_freq", 110.0)]),
        Err(CompileError::SynthTriggerCollision { .. })
    ));
    // Non-synthesizer updates may still follow
    assert_eq!(seq.update(1e-3, &[("x", 0.)], &[], &[]), Ok(150));
}

#[test]
fn collision_is_cumulative() {
    let mut seq = sequencer();
    seq.update(1e-3, &[("x", 1.)], &[], &[]).unwrap();
    seq.update(4e-6, &[("y", 1.)], &[], &[]).unwrap();
    // Boundary 1104: the two analog pairs plus the digital block need [1094, 1104)
    assert!(matches!(
        seq.update(
            1e-3,
            &[("x", 1.), ("y", 1.)],
            &[("shutter", true)],
            &[]
        ),
        Err(CompileError::WriteCollision { .. })
    ));
    // Only x fits
    assert_eq!(seq.update(1e-3, &[("x", 1.)], &[], &[]), Ok(1104));
}

#[test]
fn boundaries_stay_on_exact_ticks_over_a_long_run() {
    let mut seq = sequencer();
    let mut expected = 100;
    for _ in 0..200 {
        assert_eq!(seq.update(1e-3, &[], &[], &[]), Ok(expected));
        expected += 1000;
    }
    // Synthesizer updates exactly one trigger width apart, deep into the run
    for _ in 0..20 {
        assert_eq!(
            seq.update(100e-6, &[], &[], &[("cooling_freq", 80.)]),
            Ok(expected)
        );
        expected += 100;
    }
    assert_eq!(seq.row_count(), 20);
    assert_eq!(seq.step(), expected);
}

#[test]
fn mixed_durations_sum_to_whole_ticks() {
    let mut seq = sequencer();
    let durations = [(1e-4, 100), (1e-3, 1000), (3e-6, 3), (7e-5, 70)];
    let mut expected = 100;
    for i in 0..2000 {
        let (duration, ticks) = durations[i % durations.len()];
        // One analog pair per update: a boundary one step early would hit the previous epoch word
        assert_eq!(seq.update(duration, &[("x", 1.)], &[], &[]), Ok(expected));
        expected += ticks;
    }
    assert_eq!(seq.finish().sample_count(), expected);
}
