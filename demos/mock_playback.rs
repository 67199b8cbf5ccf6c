//! Mock playback example.
//!
//! Brings a pipeline up on the in-process mock hardware, feeds a second of
//! silent stereo PCM and prints the events and buffer usage it sees.
//!
//! Run with: RUST_LOG=omx_pipeline=debug cargo run --example mock_playback

use std::sync::Arc;
use std::time::Duration;

use omx_pipeline::hardware::mock::MockHardware;
use omx_pipeline::{
    AudioCodec, AudioPort, ChannelHandler, ClockReference, ComponentRole, Pipeline,
    PipelineEvent, NORMAL_SCALE,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// 20 ms of 48 kHz stereo 16-bit silence.
const FRAME: [u8; 3840] = [0; 3840];
/// 20 ms in 90 kHz units.
const FRAME_PTS: i64 = 1800;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let hw = Arc::new(MockHardware::new());
    let (tx, mut rx) = mpsc::channel(256);

    let pipeline = Pipeline::builder(hw.clone())
        .display(0, 2)
        .add_handler(Arc::new(ChannelHandler::new(tx)))
        .init()?;

    pipeline.setup_audio_render(AudioCodec::Pcm, 2, AudioPort::Hdmi, 48000, 0)?;
    pipeline.set_clock_reference(ClockReference::Audio);
    pipeline.start_clock(false, true);
    pipeline.set_clock_scale(NORMAL_SCALE);
    pipeline.set_volume(200);

    // Feed one second of audio, letting the "hardware" drain every 10 frames.
    let mut pts = 0;
    for frame in 0..50 {
        let Some(mut buf) = pipeline.get_audio_buffer(pts) else {
            println!("audio pool exhausted at frame {frame}");
            break;
        };
        buf.append(&FRAME);
        if !pipeline.empty_audio_buffer(buf) {
            println!("buffer refused at frame {frame}");
        }
        pts += FRAME_PTS;

        if frame % 10 == 9 {
            hw.complete_buffers(ComponentRole::AudioRender);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    println!("audio buffer usage: {}%", pipeline.buffer_usage());

    let mut emptied = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            PipelineEvent::BufferEmptied(_) => emptied += 1,
            other => println!("event: {other:?}"),
        }
    }
    println!("buffers emptied: {emptied}");

    pipeline.deinit();
    Ok(())
}
