//! Builder pattern for `Pipeline`.

use std::sync::Arc;

use crate::handler::{event_handler, EventHandler, PipelineEvent};
use crate::hardware::Hardware;
use crate::{Pipeline, PipelineConfig, PipelineError};

/// Builder for configuring and initializing a pipeline.
///
/// Use [`Pipeline::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use omx_pipeline::hardware::mock::MockHardware;
/// use omx_pipeline::{Pipeline, PipelineConfig, PipelineEvent};
///
/// let pipeline = Pipeline::builder(Arc::new(MockHardware::new()))
///     .display(0, 2)
///     .with_config(PipelineConfig::default())
///     .on_event(|e| {
///         if e == PipelineEvent::BufferStalled {
///             tracing::warn!("video decoder stalled");
///         }
///     })
///     .init()?;
///
/// pipeline.deinit();
/// # Ok::<(), omx_pipeline::PipelineError>(())
/// ```
///
/// [`Pipeline::builder()`]: crate::Pipeline::builder
#[must_use]
pub struct PipelineBuilder {
    hardware: Arc<dyn Hardware>,
    display: u32,
    layer: i32,
    handlers: Vec<Arc<dyn EventHandler>>,
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Creates a builder for `hardware` with default settings: display 0,
    /// layer 0.
    pub fn new(hardware: Arc<dyn Hardware>) -> Self {
        Self {
            hardware,
            display: 0,
            layer: 0,
            handlers: Vec::new(),
            config: PipelineConfig::default(),
        }
    }

    /// Set the display number and compositing layer of the video render.
    pub fn display(mut self, display: u32, layer: i32) -> Self {
        self.display = display;
        self.layer = layer;
        self
    }

    /// Register a handler before the dispatcher starts, so it sees every
    /// event.
    pub fn add_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Register a closure receiving every event, ticks included.
    pub fn on_event<F>(self, callback: F) -> Self
    where
        F: Fn(PipelineEvent) + Send + Sync + 'static,
    {
        self.add_handler(event_handler(callback))
    }

    /// Set custom pipeline configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), PipelineError> {
        self.config.validate()
    }

    /// Bring the pipeline up.
    ///
    /// Creates the video render, clock, audio render and video scheduler,
    /// sets up the clock tunnels, starts the clock component, selects the
    /// video reference and starts the event dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - A component cannot be created
    /// - A clock tunnel cannot be set up
    /// - The clock or audio render does not change state
    /// - The dispatcher thread cannot be spawned
    pub fn init(self) -> Result<Pipeline, PipelineError> {
        self.validate()?;
        Pipeline::start(
            self.hardware,
            self.config,
            self.display,
            self.layer,
            self.handlers,
        )
    }
}
