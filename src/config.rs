use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    // 缓冲配置
    /// Seconds of decoded audio a network stream accumulates before playback starts.
    pub buffer_seconds: u32,
    /// Decoding pauses while more than this many seconds are buffered.
    pub max_buffered_seconds: u32,
    pub fade_in_seconds: f32,

    // 渲染配置
    pub render_sample_rate: u32,
    pub period_frames: usize,
    pub channels: usize,

    // 测试音配置
    pub test_tone_frequency: f32,
    pub test_tone_amplitude: f32,

    // 网络配置
    pub http_user_agent: String,
    pub event_capacity: usize,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            buffer_seconds: env!("BUFFER_SECONDS").parse()
                .map_err(|_| "Failed to parse BUFFER_SECONDS")?,
            max_buffered_seconds: env!("MAX_BUFFERED_SECONDS").parse()
                .map_err(|_| "Failed to parse MAX_BUFFERED_SECONDS")?,
            fade_in_seconds: env!("FADE_IN_SECONDS").parse()
                .map_err(|_| "Failed to parse FADE_IN_SECONDS")?,

            render_sample_rate: env!("RENDER_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse RENDER_SAMPLE_RATE")?,
            period_frames: env!("RENDER_PERIOD_FRAMES").parse()
                .map_err(|_| "Failed to parse RENDER_PERIOD_FRAMES")?,
            channels: env!("RENDER_CHANNELS").parse()
                .map_err(|_| "Failed to parse RENDER_CHANNELS")?,

            test_tone_frequency: env!("TEST_TONE_FREQUENCY").parse()
                .map_err(|_| "Failed to parse TEST_TONE_FREQUENCY")?,
            test_tone_amplitude: env!("TEST_TONE_AMPLITUDE").parse()
                .map_err(|_| "Failed to parse TEST_TONE_AMPLITUDE")?,

            http_user_agent: env!("HTTP_USER_AGENT").to_string(),
            event_capacity: env!("EVENT_CAPACITY").parse()
                .map_err(|_| "Failed to parse EVENT_CAPACITY")?,
        })
    }

    /// Number of frames a fade-in ramp spans at `sample_rate`.
    pub fn fade_in_frames(&self, sample_rate: u32) -> usize {
        (self.fade_in_seconds.max(0.0) * sample_rate as f32) as usize
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_time_defaults_parse() {
        let config = Config::new().unwrap();
        assert!(config.buffer_seconds > 0);
        assert!(config.max_buffered_seconds >= config.buffer_seconds);
        assert!(config.channels > 0);
        assert!(config.period_frames > 0);
        assert!(!config.http_user_agent.is_empty());
    }

    #[test]
    fn fade_in_frames_scales_with_rate() {
        let mut config = Config::default();
        config.fade_in_seconds = 0.5;
        assert_eq!(config.fade_in_frames(48000), 24000);
        config.fade_in_seconds = -1.0;
        assert_eq!(config.fade_in_frames(48000), 0);
    }
}
