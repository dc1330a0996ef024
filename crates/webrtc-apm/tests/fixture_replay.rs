//! Replays matched far/near streams through the full component chain and
//! checks the per-frame flag counts against the `OutputData` records in
//! `tests/data/`.
//!
//! Set `WEBRTC_APM_REGENERATE_OUTPUT_DATA=1` to rewrite the records after an
//! intended change in the chain. A case without a record gets one written
//! and reported on stderr so it can be committed.

use std::env;
use std::path::{Path, PathBuf};

use webrtc_apm::{
    AudioFrame, AudioProcessing, Error, GainControlMode, Likelihood, NoiseSuppressionLevel,
};
use webrtc_apm_proptest::fixture::{OutputData, fixture_file_name, read_output_data, write_output_data};
use webrtc_apm_proptest::signals::SignalPair;

const CHANNEL_CASES: [(usize, usize); 4] = [(1, 1), (1, 2), (2, 1), (2, 2)];
const RATES: [u32; 3] = [8000, 16000, 32000];
const FRAMES: usize = 400;

fn build(rate: u32, near_channels: usize, reverse_channels: usize) -> AudioProcessing {
    let apm = AudioProcessing::builder()
        .sample_rate_hz(rate)
        .num_channels(near_channels, near_channels)
        .num_reverse_channels(reverse_channels)
        .build()
        .unwrap();

    let aec = apm.echo_cancellation();
    aec.enable(true).unwrap();
    aec.enable_drift_compensation(true).unwrap();
    aec.enable_metrics(true).unwrap();

    let agc = apm.gain_control();
    agc.set_analog_level_limits(0, 255).unwrap();
    agc.set_mode(GainControlMode::AdaptiveAnalog).unwrap();
    agc.enable(true).unwrap();

    apm.noise_suppression().set_level(NoiseSuppressionLevel::High).unwrap();
    apm.noise_suppression().enable(true).unwrap();
    apm.high_pass_filter().enable(true).unwrap();
    apm.voice_detection().set_likelihood(Likelihood::Moderate).unwrap();
    apm.voice_detection().enable(true).unwrap();
    apm.level_estimator().enable(true).unwrap();
    apm
}

fn replay(rate: u32, near_channels: usize, reverse_channels: usize) -> OutputData {
    let apm = build(rate, near_channels, reverse_channels);
    let mut signals = SignalPair::new(rate, reverse_channels, near_channels, 0x5eed);
    let mut analog_level = 127;
    let mut out = OutputData::default();

    for _ in 0..FRAMES {
        let (far, near) = signals.next_frames();
        apm.analyze_reverse_stream(&AudioFrame::from_interleaved(rate, reverse_channels, far))
            .unwrap();

        let mut frame = AudioFrame::from_interleaved(rate, near_channels, near);
        apm.set_stream_delay_ms(SignalPair::ECHO_DELAY_MS as i32).unwrap();
        apm.set_stream_drift_samples(0);
        apm.set_stream_analog_level(analog_level).unwrap();
        match apm.process_stream(&mut frame) {
            Ok(()) => {}
            Err(err) => assert!(err.is_warning(), "{err}"),
        }
        assert_eq!(frame.sample_rate_hz, rate);
        assert_eq!(frame.samples_per_channel, rate as usize / 100);
        assert_eq!(frame.data.len(), frame.samples_per_channel * near_channels);

        analog_level = apm.gain_control().stream_analog_level();
        assert!((0..=255).contains(&analog_level));

        out.has_echo_count += u32::from(apm.echo_cancellation().stream_has_echo());
        out.has_voice_count += u32::from(apm.voice_detection().stream_has_voice());
        out.is_saturated_count += u32::from(apm.gain_control().stream_is_saturated());
    }

    let rms = apm.level_estimator().rms().unwrap();
    assert!((0..=127).contains(&rms));
    out
}

const REGENERATE_VAR: &str = "WEBRTC_APM_REGENERATE_OUTPUT_DATA";

fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("data")
}

#[test]
fn replay_matches_committed_counts() {
    let dir = data_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let regenerate = env::var_os(REGENERATE_VAR).is_some();

    for &(near, reverse) in &CHANNEL_CASES {
        for &rate in &RATES {
            let path = dir.join(fixture_file_name(near, reverse, rate));
            let actual = replay(rate, near, reverse);
            if regenerate || !path.exists() {
                write_output_data(&path, &actual).unwrap();
                eprintln!("wrote {}: {actual:?}", path.display());
                continue;
            }
            let expected = read_output_data(&path).unwrap();
            assert_eq!(
                actual, expected,
                "near={near} reverse={reverse} rate={rate}; rerun with {REGENERATE_VAR}=1 if the change is intended"
            );
        }
    }
}

#[test]
fn fresh_instances_repeat_the_counts() {
    for &rate in &RATES {
        assert_eq!(replay(rate, 2, 1), replay(rate, 2, 1), "rate={rate}");
    }
}

#[test]
fn replay_detects_voice_and_clipping() {
    let data = replay(16000, 1, 1);
    assert!(data.has_voice_count > 0, "{data:?}");
    assert!(data.is_saturated_count > 0, "{data:?}");
    assert!(data.has_voice_count < FRAMES as u32, "{data:?}");
}

#[test]
fn missing_analog_level_stops_the_replay() {
    let apm = build(16000, 1, 1);
    let mut frame = AudioFrame::new(16000, 1);
    apm.set_stream_delay_ms(20).unwrap();
    apm.set_stream_drift_samples(0);
    assert_eq!(apm.process_stream(&mut frame), Err(Error::StreamParameterNotSet));
}
