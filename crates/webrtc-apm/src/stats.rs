//! Audio processing statistics.
//!
//! Ported from `AudioProcessingStats` in
//! `api/audio/audio_processing_statistics.h`.

use serde::{Deserialize, Serialize};
use webrtc_aec::EchoMetrics;

/// Snapshot of the per-frame flags and echo metrics after the last
/// capture frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioProcessingStats {
    /// ERL = 10 log10(P_far / P_echo), averaged, in dB.
    pub echo_return_loss: Option<f32>,
    /// ERLE = 10 log10(P_echo / P_out), averaged, in dB.
    pub echo_return_loss_enhancement: Option<f32>,
    /// ERL + ERLE, averaged, in dB.
    pub residual_echo_return_loss: Option<f32>,
    /// Attenuation of the nonlinear processor alone, averaged, in dB.
    pub a_nlp: Option<f32>,
    /// The echo canceller found echo in the last frame.
    pub has_echo: bool,
    /// The voice detector (or the caller) marked the last frame as speech.
    pub has_voice: bool,
    /// The gain controller saw clipping in the last frame.
    pub saturated: bool,
}

impl AudioProcessingStats {
    pub(crate) fn set_echo_metrics(&mut self, metrics: &EchoMetrics) {
        self.echo_return_loss = Some(metrics.echo_return_loss.average);
        self.echo_return_loss_enhancement = Some(metrics.echo_return_loss_enhancement.average);
        self.residual_echo_return_loss = Some(metrics.residual_echo_return_loss.average);
        self.a_nlp = Some(metrics.a_nlp.average);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_has_no_values() {
        let stats = AudioProcessingStats::default();
        assert!(stats.echo_return_loss.is_none());
        assert!(stats.echo_return_loss_enhancement.is_none());
        assert!(stats.residual_echo_return_loss.is_none());
        assert!(stats.a_nlp.is_none());
        assert!(!stats.has_echo && !stats.has_voice && !stats.saturated);
    }

    #[test]
    fn metrics_use_averages() {
        let mut metrics = EchoMetrics::default();
        metrics.echo_return_loss.average = 12.5;
        metrics.a_nlp.average = 3.0;
        let mut stats = AudioProcessingStats::default();
        stats.set_echo_metrics(&metrics);
        assert_eq!(stats.echo_return_loss, Some(12.5));
        assert_eq!(stats.a_nlp, Some(3.0));
    }
}
