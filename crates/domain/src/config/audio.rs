use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound audio buffering (spec §5 "Audio inbound buffer")
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "d_sample_rate")]
    pub sample_rate_hz: u32,
    /// Bounded circular buffer capacity, expressed in seconds of audio.
    #[serde(default = "d_buffer_seconds")]
    pub inbound_buffer_seconds: f64,
    /// Largest single audio_chunk payload accepted from a client.
    #[serde(default = "d_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: d_sample_rate(),
            inbound_buffer_seconds: d_buffer_seconds(),
            max_frame_bytes: d_max_frame_bytes(),
        }
    }
}

impl AudioConfig {
    /// Buffer capacity in bytes, assuming 16-bit mono PCM.
    pub fn buffer_capacity_bytes(&self) -> usize {
        (self.sample_rate_hz as f64 * self.inbound_buffer_seconds * 2.0) as usize
    }
}

fn d_sample_rate() -> u32 {
    16_000
}
fn d_buffer_seconds() -> f64 {
    10.0
}
fn d_max_frame_bytes() -> usize {
    100_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_capacity_matches_spec_approximation() {
        let cfg = AudioConfig::default();
        // spec: <= 10s @ 16kHz mono (~320 KB)
        assert_eq!(cfg.buffer_capacity_bytes(), 320_000);
    }
}
