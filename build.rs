use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    buffering: Buffering,
    render: Render,
    test_tone: TestTone,
    network: Network,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Buffering {
    buffer_seconds: u32,
    max_buffered_seconds: u32,
    fade_in_seconds: f32,
}

#[derive(Deserialize)]
struct Render {
    sample_rate: u32,
    period_frames: usize,
    channels: usize,
}

#[derive(Deserialize)]
struct TestTone {
    frequency: f32,
    amplitude: f32,
}

#[derive(Deserialize)]
struct Network {
    user_agent: String,
    event_capacity: usize,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 缓冲配置
    println!("cargo:rustc-env=BUFFER_SECONDS={}", config.buffering.buffer_seconds);
    println!("cargo:rustc-env=MAX_BUFFERED_SECONDS={}", config.buffering.max_buffered_seconds);
    println!("cargo:rustc-env=FADE_IN_SECONDS={}", config.buffering.fade_in_seconds);

    // 渲染配置
    println!("cargo:rustc-env=RENDER_SAMPLE_RATE={}", config.render.sample_rate);
    println!("cargo:rustc-env=RENDER_PERIOD_FRAMES={}", config.render.period_frames);
    println!("cargo:rustc-env=RENDER_CHANNELS={}", config.render.channels);

    println!("cargo:rustc-env=TEST_TONE_FREQUENCY={}", config.test_tone.frequency);
    println!("cargo:rustc-env=TEST_TONE_AMPLITUDE={}", config.test_tone.amplitude);

    // 网络配置
    println!("cargo:rustc-env=HTTP_USER_AGENT={}", config.network.user_agent);
    println!("cargo:rustc-env=EVENT_CAPACITY={}", config.network.event_capacity);
}
