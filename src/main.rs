use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use room_stream::audio::Mp3Decoder;
use room_stream::config::Config;
use room_stream::render_loop::RenderLoop;
use room_stream::streamer::{FileStreamer, NetworkStreamer, StreamEvent, StreamNode, TestStreamer};
use room_stream::transport::HttpTransport;
use tokio::signal;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// HTTP(S) stream with prebuffering
    Network,
    /// Local MP3 file
    File,
    /// Sine test tone
    Tone,
}

#[derive(Parser, Debug)]
#[command(name = "room-stream")]
#[command(about = "Buffered MP3 stream player with rate adaptation")]
#[command(version)]
struct Args {
    /// Stream URL or file path
    #[arg(env = "ROOM_STREAM_SOURCE")]
    source: Option<String>,

    /// Kind of stream node to drive
    #[arg(short, long, value_enum, default_value = "network")]
    mode: Mode,

    /// Override the prebuffer length in seconds
    #[arg(short, long, env = "ROOM_STREAM_BUFFER_SECONDS")]
    buffer_seconds: Option<u32>,

    /// Override the render sample rate in Hz
    #[arg(short = 'r', long)]
    sample_rate: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    let args = Args::parse();

    // 加载配置，命令行参数优先
    let mut config = Config::new().unwrap_or_default();
    if let Some(seconds) = args.buffer_seconds {
        config.buffer_seconds = seconds;
    }
    if let Some(rate) = args.sample_rate {
        config.render_sample_rate = rate;
    }
    log::info!("{} {} starting with {:?}", env!("APP_NAME"), env!("APP_VERSION"), config);

    // 事件通道
    let (tx_event, mut rx_event) = mpsc::channel::<StreamEvent>(config.event_capacity.max(1));

    let node: StreamNode = match args.mode {
        Mode::Network => {
            let runtime = tokio::runtime::Handle::current();
            let transport = Arc::new(HttpTransport::new(&config, runtime)?);
            NetworkStreamer::new(Box::new(Mp3Decoder::new()), transport, &config, tx_event).into()
        }
        Mode::File => FileStreamer::new(Box::new(Mp3Decoder::new()), &config, tx_event).into(),
        Mode::Tone => TestStreamer::from_config(&config).into(),
    };

    let mut render = RenderLoop::start(node, &config)?;
    if let Some(source) = &args.source {
        render.set_source(source);
    } else if args.mode != Mode::Tone {
        anyhow::bail!("a source is required in {:?} mode", args.mode);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down...");
                break;
            }

            Some(event) = rx_event.recv() => {
                match event {
                    StreamEvent::Error(reason) => {
                        eprintln!("Stream error: {}", reason);
                    }
                    StreamEvent::Finished => {
                        println!("Stream finished");
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                let status = render.status();
                println!("{}", serde_json::to_string(&status)?);
            }
        }
    }

    render.stop();
    Ok(())
}
