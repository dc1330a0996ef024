//! Property tests over the public API.

use test_strategy::proptest;
use webrtc_apm::{
    AudioFrame, AudioProcessing, EchoSuppressionLevel, Error, GainControlMode, Likelihood,
    NoiseSuppressionLevel, RoutingMode,
};
use webrtc_apm_proptest::generators::{MultiChannelFrameI16, StreamShape, enum_index};

/// Set from the raw integer; out-of-range values must fail and leave the
/// previous setting in place.
fn check_mode<T>(
    raw: i32,
    set: impl Fn(T) -> Result<(), Error>,
    get: impl Fn() -> T,
) where
    T: TryFrom<i32, Error = Error> + Copy + PartialEq + std::fmt::Debug,
{
    let before = get();
    match T::try_from(raw) {
        Ok(mode) => {
            set(mode).unwrap();
            assert_eq!(get(), mode);
        }
        Err(err) => {
            assert_eq!(err, Error::BadParameter);
            assert_eq!(get(), before);
        }
    }
}

#[proptest]
fn echo_suppression_level_round_trips(#[strategy(enum_index(3))] raw: i32) {
    let apm = AudioProcessing::new();
    let aec = apm.echo_cancellation();
    check_mode::<EchoSuppressionLevel>(raw, |m| aec.set_suppression_level(m), || aec.suppression_level());
}

#[proptest]
fn routing_mode_round_trips(#[strategy(enum_index(5))] raw: i32) {
    let apm = AudioProcessing::new();
    let aecm = apm.echo_control_mobile();
    check_mode::<RoutingMode>(raw, |m| aecm.set_routing_mode(m), || aecm.routing_mode());
}

#[proptest]
fn gain_control_mode_round_trips(#[strategy(enum_index(3))] raw: i32) {
    let apm = AudioProcessing::new();
    let agc = apm.gain_control();
    check_mode::<GainControlMode>(raw, |m| agc.set_mode(m), || agc.mode());
}

#[proptest]
fn noise_suppression_level_round_trips(#[strategy(enum_index(4))] raw: i32) {
    let apm = AudioProcessing::new();
    let ns = apm.noise_suppression();
    check_mode::<NoiseSuppressionLevel>(raw, |l| ns.set_level(l), || ns.level());
}

#[proptest]
fn likelihood_round_trips(#[strategy(enum_index(4))] raw: i32) {
    let apm = AudioProcessing::new();
    let vad = apm.voice_detection();
    check_mode::<Likelihood>(raw, |l| vad.set_likelihood(l), || vad.likelihood());
}

#[proptest]
fn external_voice_flag_is_readable(has_voice: bool, vad_enabled: bool) {
    let apm = AudioProcessing::new();
    apm.voice_detection().enable(vad_enabled).unwrap();
    apm.set_stream_has_voice(has_voice).unwrap();
    assert_eq!(apm.voice_detection().stream_has_voice(), has_voice);
}

#[proptest]
fn external_voice_flag_survives_processing(has_voice: bool) {
    let apm = AudioProcessing::new();
    apm.voice_detection().enable(true).unwrap();
    apm.set_stream_has_voice(has_voice).unwrap();
    let mut frame = AudioFrame::new(16000, 1);
    apm.process_stream(&mut frame).unwrap();
    assert_eq!(apm.voice_detection().stream_has_voice(), has_voice);
    assert_eq!(apm.statistics().has_voice, has_voice);
}

#[proptest(cases = 32)]
fn processing_keeps_rate_and_frame_length(shape: StreamShape, seed: u16) {
    let rate = shape.sample_rate.hz();
    let input = shape.input.count();
    let output = shape.output.count();
    let apm = AudioProcessing::builder()
        .sample_rate_hz(rate)
        .num_channels(input, output)
        .num_reverse_channels(shape.reverse.count())
        .build()
        .unwrap();
    apm.noise_suppression().enable(true).unwrap();
    apm.high_pass_filter().enable(true).unwrap();
    apm.voice_detection().enable(true).unwrap();

    let n = shape.sample_rate.frame_size();
    let data = (0..n * input)
        .map(|i| ((i as i32 * 37 + i32::from(seed)) % 2001 - 1000) as i16)
        .collect();
    let mut frame = AudioFrame::from_interleaved(rate, input, data);
    apm.process_stream(&mut frame).unwrap();
    assert_eq!(frame.sample_rate_hz, rate);
    assert_eq!(frame.samples_per_channel, n);
    assert_eq!(frame.num_channels, output);
    assert_eq!(frame.data.len(), n * output);
}

#[proptest(cases = 32)]
fn disabled_chain_is_bit_exact(frame: MultiChannelFrameI16) {
    let rate = frame.sample_rate.hz();
    let channels = frame.channels.count();
    let apm = AudioProcessing::builder()
        .sample_rate_hz(rate)
        .num_channels(channels, channels)
        .build()
        .unwrap();
    let mut audio = AudioFrame::from_interleaved(rate, channels, frame.samples.clone());
    apm.process_stream(&mut audio).unwrap();
    assert_eq!(audio.data, frame.samples);
}

#[proptest]
fn stream_delay_is_clamped(#[strategy(0i32..2000)] delay: i32) {
    let apm = AudioProcessing::new();
    let result = apm.set_stream_delay_ms(delay);
    if delay > 500 {
        assert_eq!(result, Err(Error::BadStreamParameterWarning));
        assert_eq!(apm.stream_delay_ms(), 500);
    } else {
        assert_eq!(result, Ok(()));
        assert_eq!(apm.stream_delay_ms(), delay);
    }
}
