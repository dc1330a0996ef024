//! Configuration and stream-parameter scenarios through the public API.

use webrtc_apm::{
    AudioFrame, AudioProcessing, Config, EchoMode, Error, GainControlMode, NoiseSuppressionLevel,
};
use webrtc_apm_proptest::comparison::{assert_all_near, assert_i16_exact};
use webrtc_apm_proptest::signals::SignalPair;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn configuration_gauntlet() {
    init_tracing();
    let apm = AudioProcessing::new();

    assert_eq!(apm.set_sample_rate_hz(10000), Err(Error::BadParameter));
    assert_eq!(apm.sample_rate_hz(), 16000);
    apm.set_sample_rate_hz(32000).unwrap();
    assert_eq!(apm.sample_rate_hz(), 32000);

    assert_eq!(apm.set_num_channels(0, 1), Err(Error::BadParameter));
    assert_eq!(apm.set_num_channels(3, 1), Err(Error::BadParameter));
    assert_eq!(apm.num_input_channels(), 1);
    apm.set_num_channels(2, 2).unwrap();
    assert_eq!(apm.num_input_channels(), 2);
    assert_eq!(apm.num_output_channels(), 2);

    assert_eq!(apm.set_num_reverse_channels(3), Err(Error::BadParameter));
    assert_eq!(apm.num_reverse_channels(), 1);
    apm.set_num_reverse_channels(2).unwrap();
    assert_eq!(apm.num_reverse_channels(), 2);
}

#[test]
fn missing_stream_parameters() {
    init_tracing();
    let apm = AudioProcessing::new();
    apm.echo_cancellation().enable(true).unwrap();
    apm.echo_cancellation().enable_drift_compensation(true).unwrap();

    let mut frame = AudioFrame::new(16000, 1);
    assert_eq!(apm.process_stream(&mut frame), Err(Error::StreamParameterNotSet));

    apm.set_stream_delay_ms(100).unwrap();
    assert_eq!(apm.process_stream(&mut frame), Err(Error::StreamParameterNotSet));

    apm.set_stream_drift_samples(0);
    apm.process_stream(&mut frame).unwrap();

    // Parameters are consumed by the frame.
    assert_eq!(apm.process_stream(&mut frame), Err(Error::StreamParameterNotSet));
}

#[test]
fn analog_level_requirement_follows_mode() {
    let apm = AudioProcessing::new();
    apm.gain_control().enable(true).unwrap();
    let mut frame = AudioFrame::new(16000, 1);

    assert_eq!(apm.process_stream(&mut frame), Err(Error::StreamParameterNotSet));
    apm.set_stream_analog_level(127).unwrap();
    apm.process_stream(&mut frame).unwrap();

    // An out-of-range level is rejected and does not satisfy the frame.
    assert_eq!(apm.set_stream_analog_level(300), Err(Error::BadParameter));
    assert_eq!(apm.process_stream(&mut frame), Err(Error::StreamParameterNotSet));

    apm.gain_control().set_mode(GainControlMode::AdaptiveDigital).unwrap();
    apm.process_stream(&mut frame).unwrap();
}

#[test]
fn echo_canceller_exclusion_at_32khz() {
    init_tracing();
    let apm = AudioProcessing::new();
    apm.set_sample_rate_hz(32000).unwrap();
    apm.echo_cancellation().enable(true).unwrap();
    assert_eq!(apm.echo_control_mobile().enable(true), Err(Error::BadSampleRate));

    apm.set_sample_rate_hz(16000).unwrap();
    assert_eq!(apm.echo_control_mobile().enable(true), Err(Error::BadParameter));
    assert_eq!(apm.echo_mode(), EchoMode::Wideband);

    apm.echo_cancellation().enable(false).unwrap();
    apm.echo_control_mobile().enable(true).unwrap();
    assert_eq!(apm.echo_mode(), EchoMode::Mobile);
    assert_eq!(apm.echo_cancellation().enable(true), Err(Error::BadParameter));
    assert_eq!(apm.set_sample_rate_hz(32000), Err(Error::BadSampleRate));
    assert_eq!(apm.sample_rate_hz(), 16000);
}

#[test]
fn mobile_canceller_runs_at_8_and_16khz() {
    for rate in [8000, 16000] {
        let apm = AudioProcessing::builder().sample_rate_hz(rate).build().unwrap();
        apm.echo_control_mobile().enable(true).unwrap();
        let mut signals = SignalPair::new(rate, 1, 1, 11);
        for _ in 0..50 {
            let (far, near) = signals.next_frames();
            apm.analyze_reverse_stream(&AudioFrame::from_interleaved(rate, 1, far))
                .unwrap();
            let mut frame = AudioFrame::from_interleaved(rate, 1, near);
            apm.set_stream_delay_ms(60).unwrap();
            apm.process_stream(&mut frame).unwrap();
            assert_eq!(frame.samples_per_channel, rate as usize / 100);
        }
    }
}

#[test]
fn metrics_require_enabled_canceller() {
    let apm = AudioProcessing::new();
    assert_eq!(apm.echo_cancellation().metrics().err(), Some(Error::NotEnabled));
    apm.echo_cancellation().enable(true).unwrap();
    apm.echo_cancellation().metrics().unwrap();
}

#[test]
fn frame_shape_mismatch_is_rejected() {
    let apm = AudioProcessing::new();
    let mut wrong_rate = AudioFrame::new(8000, 1);
    assert_eq!(apm.process_stream(&mut wrong_rate), Err(Error::BadSampleRate));

    let mut wrong_channels = AudioFrame::new(16000, 2);
    assert_eq!(
        apm.process_stream(&mut wrong_channels),
        Err(Error::BadNumberChannels)
    );

    let mut short = AudioFrame::from_interleaved(16000, 1, vec![7; 100]);
    assert_eq!(apm.process_stream(&mut short), Err(Error::BadDataLength));
    assert!(short.data.iter().all(|&s| s == 7));
}

#[test]
fn all_disabled_is_transparent_at_32khz() {
    let apm = AudioProcessing::builder().sample_rate_hz(32000).build().unwrap();
    let mut signals = SignalPair::new(32000, 1, 1, 5);
    for _ in 0..20 {
        let (_, near) = signals.next_frames();
        let mut frame = AudioFrame::from_interleaved(32000, 1, near.clone());
        apm.process_stream(&mut frame).unwrap();
        assert_i16_exact(&frame.data, &near);
    }
}

#[test]
fn band_split_round_trip_error_is_bounded() {
    // Voice detection alone forces the band split without touching
    // either band, so the output is the filter bank's reconstruction.
    let apm = AudioProcessing::builder().sample_rate_hz(32000).build().unwrap();
    apm.voice_detection().enable(true).unwrap();
    let mut frame = AudioFrame::new(32000, 1);
    for i in 0..30 {
        frame.data.fill(1000);
        apm.process_stream(&mut frame).unwrap();
        if i >= 3 {
            assert_all_near(&frame.data, 1000, 4);
        }
    }
}

#[test]
fn apply_config_then_read_back() {
    let apm = AudioProcessing::new();
    let mut config = Config::default();
    config.echo_control_mobile.enabled = true;
    config.noise_suppression.enabled = true;
    config.noise_suppression.level = NoiseSuppressionLevel::VeryHigh;
    config.high_pass_filter.enabled = true;
    apm.apply_config(&config).unwrap();
    assert_eq!(apm.config(), config);
    assert_eq!(apm.echo_mode(), EchoMode::Mobile);

    // Switching cancellers in one snapshot disables the old one first.
    config.echo_control_mobile.enabled = false;
    config.echo_cancellation.enabled = true;
    apm.apply_config(&config).unwrap();
    assert_eq!(apm.echo_mode(), EchoMode::Wideband);

    config.echo_control_mobile.enabled = true;
    assert_eq!(apm.apply_config(&config), Err(Error::BadParameter));
    assert_eq!(apm.echo_mode(), EchoMode::Wideband);
}

#[test]
fn config_survives_json() {
    let mut config = Config::default();
    config.gain_control.enabled = true;
    config.gain_control.mode = GainControlMode::FixedDigital;
    config.voice_detection.enabled = true;
    let json = serde_json::to_string(&config).unwrap();
    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);

    // Missing fields fall back to defaults.
    let sparse: Config =
        serde_json::from_str(r#"{"noise_suppression":{"enabled":true}}"#).unwrap();
    assert!(sparse.noise_suppression.enabled);
    assert_eq!(sparse.noise_suppression.level, NoiseSuppressionLevel::Moderate);
}

#[test]
fn initialize_keeps_shape_after_changes() {
    let apm = AudioProcessing::new();
    apm.set_sample_rate_hz(8000).unwrap();
    apm.set_num_channels(2, 1).unwrap();
    apm.noise_suppression().enable(true).unwrap();
    apm.initialize().unwrap();
    assert_eq!(apm.sample_rate_hz(), 8000);
    assert_eq!(apm.num_input_channels(), 2);
    assert_eq!(apm.num_output_channels(), 1);
    assert!(apm.noise_suppression().is_enabled());
}
