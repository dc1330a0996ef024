//! Mobile echo control component.
//!
//! Same handle layout as the wideband canceller. When noise suppression
//! runs too, the handles estimate echo on the low band as captured and
//! apply their gain to the noise-suppressed band.
//!
//! C++ source: `webrtc/modules/audio_processing/echo_control_mobile_impl.cc`

use derive_more::Debug;
use parking_lot::Mutex;
use webrtc_aecm::{AecmConfig, EchoControlMobile as MobileHandle};

use crate::audio_buffer::AudioBuffer;
use crate::audio_processing_impl::AudioProcessingImpl;
use crate::config::{EchoControlMobileConfig, RoutingMode};
use crate::error::Error;
use crate::handle_bank::HandleBank;
use crate::stream_config::ProcessingConfig;

#[derive(Debug)]
pub(crate) struct EchoControlMobileImpl {
    enabled: bool,
    routing_mode: RoutingMode,
    comfort_noise: bool,
    /// Echo path supplied by the caller, applied to every new handle.
    #[debug(skip)]
    external_echo_path: Option<Vec<u8>>,
    #[debug(skip)]
    handles: HandleBank<MobileHandle>,
    #[debug(skip)]
    noisy: Vec<i16>,
    #[debug(skip)]
    clean: Vec<i16>,
}

impl EchoControlMobileImpl {
    pub(crate) fn new() -> Self {
        Self {
            enabled: false,
            routing_mode: RoutingMode::default(),
            comfort_noise: true,
            external_echo_path: None,
            handles: HandleBank::default(),
            noisy: Vec::new(),
            clean: Vec::new(),
        }
    }

    /// Bytes in a serialized echo path.
    pub(crate) fn echo_path_size_bytes() -> usize {
        MobileHandle::echo_path_size_bytes()
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn settings(&self) -> AecmConfig {
        AecmConfig {
            routing_mode: self.routing_mode.into(),
            comfort_noise: self.comfort_noise,
        }
    }

    pub(crate) fn set_enabled(&mut self, enable: bool, config: &ProcessingConfig) -> Result<(), Error> {
        if enable == self.enabled {
            return Ok(());
        }
        self.enabled = enable;
        if let Err(err) = self.initialize(config) {
            self.enabled = false;
            self.handles.clear();
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn initialize(&mut self, config: &ProcessingConfig) -> Result<(), Error> {
        if !self.enabled {
            self.handles.clear();
            return Ok(());
        }
        let rate = config.input_stream().sample_rate_hz();
        let settings = self.settings();
        let mut handles = HandleBank::build(
            config.output_stream().num_channels(),
            config.reverse_stream().num_channels(),
            || MobileHandle::new(rate, settings),
        )?;
        if let Some(path) = &self.external_echo_path {
            for handle in handles.iter_mut() {
                handle.set_echo_path_bytes(path)?;
            }
        }
        self.handles = handles;
        tracing::debug!(handles = self.handles.len(), rate, "echo control mobile initialized");
        Ok(())
    }

    fn reconfigure(&mut self) {
        let settings = self.settings();
        for handle in self.handles.iter_mut() {
            handle.set_config(settings);
        }
    }

    pub(crate) fn set_routing_mode(&mut self, mode: RoutingMode) {
        self.routing_mode = mode;
        self.reconfigure();
    }

    pub(crate) fn enable_comfort_noise(&mut self, enable: bool) {
        self.comfort_noise = enable;
        self.reconfigure();
    }

    /// Store an echo path and load it into the live handles.
    pub(crate) fn set_echo_path(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() != Self::echo_path_size_bytes() {
            return Err(Error::BadParameter);
        }
        for handle in self.handles.iter_mut() {
            handle.set_echo_path_bytes(bytes)?;
        }
        self.external_echo_path = Some(bytes.to_vec());
        Ok(())
    }

    /// Serialize the echo path of the first handle.
    pub(crate) fn echo_path(&self, bytes: &mut [u8]) -> Result<(), Error> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        if bytes.len() != Self::echo_path_size_bytes() {
            return Err(Error::BadParameter);
        }
        let handle = self.handles.first().ok_or(Error::NotEnabled)?;
        Ok(handle.echo_path_bytes(bytes)?)
    }

    pub(crate) fn analyze_reverse_stream(&mut self, render: &AudioBuffer) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        for j in 0..render.num_channels() {
            let far = render.low_band(j);
            for handle in self.handles.for_render_mut(j) {
                handle.buffer_far_end(far)?;
            }
        }
        Ok(())
    }

    pub(crate) fn process_capture_stream(
        &mut self,
        capture: &mut AudioBuffer,
        num_render: usize,
        delay_ms: i32,
    ) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        for i in 0..capture.num_channels() {
            let has_reference = capture.low_pass_reference(i).is_some();
            self.noisy.clear();
            self.noisy
                .extend_from_slice(capture.low_pass_reference(i).unwrap_or(capture.low_band(i)));
            for j in 0..num_render {
                self.clean.clear();
                self.clean.extend_from_slice(capture.low_band(i));
                let clean = has_reference.then_some(self.clean.as_slice());
                let (out, _) = capture.bands_mut(i);
                self.handles
                    .get_mut(i, j)
                    .process(&self.noisy, clean, out, delay_ms)?;
            }
        }
        Ok(())
    }

    pub(crate) fn config(&self) -> EchoControlMobileConfig {
        EchoControlMobileConfig {
            enabled: self.enabled,
            routing_mode: self.routing_mode,
            comfort_noise: self.comfort_noise,
        }
    }

    pub(crate) fn apply_settings(&mut self, config: &EchoControlMobileConfig) {
        self.routing_mode = config.routing_mode;
        self.comfort_noise = config.comfort_noise;
        self.reconfigure();
    }
}

/// Handle to the mobile echo canceller of an
/// [`AudioProcessing`](crate::AudioProcessing) instance.
///
/// Runs at 8 and 16 kHz only, and never together with the wideband
/// echo canceller.
#[derive(Debug, Clone, Copy)]
pub struct EchoControlMobile<'a> {
    #[debug(skip)]
    pub(crate) apm: &'a Mutex<AudioProcessingImpl>,
}

impl EchoControlMobile<'_> {
    /// Bytes [`set_echo_path`](Self::set_echo_path) and
    /// [`echo_path`](Self::echo_path) work with: one native-endian `i16`
    /// per frequency bin.
    pub fn echo_path_size_bytes() -> usize {
        EchoControlMobileImpl::echo_path_size_bytes()
    }

    pub fn enable(&self, enable: bool) -> Result<(), Error> {
        self.apm.lock().enable_echo_control_mobile(enable)
    }

    pub fn is_enabled(&self) -> bool {
        self.apm.lock().aecm.is_enabled()
    }

    pub fn set_routing_mode(&self, mode: RoutingMode) -> Result<(), Error> {
        self.apm.lock().aecm.set_routing_mode(mode);
        Ok(())
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.apm.lock().aecm.routing_mode
    }

    pub fn enable_comfort_noise(&self, enable: bool) -> Result<(), Error> {
        self.apm.lock().aecm.enable_comfort_noise(enable);
        Ok(())
    }

    pub fn is_comfort_noise_enabled(&self) -> bool {
        self.apm.lock().aecm.comfort_noise
    }

    /// Load a previously saved echo path. Allowed while disabled; the path
    /// is used once the canceller starts.
    pub fn set_echo_path(&self, bytes: &[u8]) -> Result<(), Error> {
        self.apm.lock().aecm.set_echo_path(bytes)
    }

    /// Save the adapted echo path.
    pub fn echo_path(&self, bytes: &mut [u8]) -> Result<(), Error> {
        self.apm.lock().aecm.echo_path(bytes)
    }
}
