//! # omx-pipeline
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Orchestration of a tunnelled hardware audio/video pipeline.
//!
//! `omx-pipeline` turns "feed buffers, set volume, set display region" into
//! the stateful handshake a multi-component hardware pipeline needs: it
//! creates the decoder, scheduler, render and clock components, wires their
//! ports with tunnels, reacts to the hardware renegotiating port settings,
//! drives the shared media clock and recycles audio input buffers.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use omx_pipeline::{AudioCodec, AudioPort, ChannelHandler, Pipeline};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::channel(64);
//!
//! let pipeline = Pipeline::builder(hardware)
//!     .display(0, 2)
//!     .add_handler(Arc::new(ChannelHandler::new(tx)))
//!     .init()?;
//!
//! pipeline.setup_audio_render(AudioCodec::Ac3, 6, AudioPort::Hdmi, 48000, 0)?;
//! pipeline.start_clock(true, true);
//!
//! while let Some(mut buf) = pipeline.get_audio_buffer(pts) {
//!     buf.append(&frame);
//!     pipeline.empty_audio_buffer(buf);
//! }
//!
//! pipeline.deinit();
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Hardware callback threads** only enqueue events and post command
//!   acknowledgements; they never touch pipeline state
//! - **Dispatcher thread** drains the event queue in arrival order under the
//!   pipeline lock and fires a 100 ms tick
//! - **Callers** use the [`Pipeline`] handle from any thread under the same
//!   lock
//!
//! The lock is reentrant, so event handlers may call back into the pipeline.

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Hardware blocks carry 32-bit fields
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod audio;
pub mod buffer;
mod builder;
pub mod clock;
mod command;
mod component;
mod config;
mod dispatcher;
pub mod display;
mod error;
mod event;
mod handler;
pub mod hardware;
mod pipeline;
pub mod ports;
mod state;
pub mod tunnel;

pub use audio::{AudioCodec, AudioPort};
pub use buffer::{BufferFlags, BufferHeader};
pub use builder::PipelineBuilder;
pub use clock::{ClockReference, INVALID_PTS, NORMAL_SCALE};
pub use command::Command;
pub use component::{ComponentRole, ComponentState};
pub use config::PipelineConfig;
pub use error::{ErrorCode, HardwareError, PipelineError};
pub use handler::{event_handler, ChannelHandler, EventHandler, PipelineEvent};
pub use pipeline::Pipeline;
pub use tunnel::{TunnelId, TunnelState};
