//! Tunnel graph and tunnel lifecycle.
//!
//! Tunnels are declared once at init and then move through
//! `Declared -> SetUp -> Disabled -> TornDown`. Setup may be repeated while
//! set up (the hardware renegotiates after a port settings change).

use std::fmt;
use std::time::Duration;

use crate::component::{ComponentRegistry, ComponentRole, ComponentState};
use crate::error::PipelineError;
use crate::hardware::TunnelSpec;

/// The fixed set of tunnels a pipeline can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TunnelId {
    /// Video decoder output to video effects input.
    DecoderToFx,
    /// Video effects output to scheduler input.
    FxToScheduler,
    /// Scheduler output to video render input.
    SchedulerToRender,
    /// Clock video port to scheduler clock input.
    ClockToScheduler,
    /// Clock audio port to audio render clock input.
    ClockToAudioRender,
}

impl TunnelId {
    /// Every tunnel, in slot order.
    pub const ALL: [Self; 5] = [
        Self::DecoderToFx,
        Self::FxToScheduler,
        Self::SchedulerToRender,
        Self::ClockToScheduler,
        Self::ClockToAudioRender,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DecoderToFx => "decoder->fx",
            Self::FxToScheduler => "fx->scheduler",
            Self::SchedulerToRender => "scheduler->render",
            Self::ClockToScheduler => "clock->scheduler",
            Self::ClockToAudioRender => "clock->audio_render",
        })
    }
}

/// Lifecycle state of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TunnelState {
    /// Not part of the graph.
    #[default]
    Undeclared,
    /// Edge recorded, no hardware resources.
    Declared,
    /// Negotiated, data can flow.
    SetUp,
    /// Data flow stopped.
    Disabled,
    /// Hardware resources released.
    TornDown,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Undeclared => "undeclared",
            Self::Declared => "declared",
            Self::SetUp => "set up",
            Self::Disabled => "disabled",
            Self::TornDown => "torn down",
        })
    }
}

/// A directed edge of the tunnel graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelDecl {
    /// Tunnel id.
    pub id: TunnelId,
    /// Component owning the output port.
    pub source: ComponentRole,
    /// Output port.
    pub source_port: u32,
    /// Component owning the input port.
    pub sink: ComponentRole,
    /// Input port.
    pub sink_port: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct TunnelSlot {
    decl: Option<TunnelDecl>,
    state: TunnelState,
}

/// Owns the tunnel graph. All access happens under the pipeline lock.
#[derive(Debug, Default)]
pub(crate) struct TunnelManager {
    slots: [TunnelSlot; 5],
}

impl TunnelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an edge. No hardware call.
    pub fn declare(&mut self, decl: TunnelDecl) -> Result<(), PipelineError> {
        let slot = &mut self.slots[decl.id.slot()];
        match slot.state {
            TunnelState::Undeclared | TunnelState::TornDown => {
                slot.decl = Some(decl);
                slot.state = TunnelState::Declared;
                tracing::debug!(
                    tunnel = %decl.id,
                    source = %decl.source,
                    source_port = decl.source_port,
                    sink = %decl.sink,
                    sink_port = decl.sink_port,
                    "tunnel declared"
                );
                Ok(())
            }
            state => Err(PipelineError::TunnelAlreadyDeclared { id: decl.id, state }),
        }
    }

    pub fn state(&self, id: TunnelId) -> TunnelState {
        self.slots[id.slot()].state
    }

    pub fn declaration(&self, id: TunnelId) -> Option<TunnelDecl> {
        self.slots[id.slot()].decl
    }

    fn resolve(
        &self,
        id: TunnelId,
        components: &ComponentRegistry,
    ) -> Result<(TunnelDecl, TunnelSpec), PipelineError> {
        let decl = self
            .declaration(id)
            .ok_or(PipelineError::TunnelNotDeclared(id))?;
        let endpoint = |role: ComponentRole| {
            components
                .handle(role)
                .ok_or(PipelineError::TunnelEndpointMissing { id, role })
        };
        let spec = TunnelSpec {
            source: endpoint(decl.source)?,
            source_port: decl.source_port,
            sink: endpoint(decl.sink)?,
            sink_port: decl.sink_port,
        };
        Ok((decl, spec))
    }

    fn require_state(
        &self,
        id: TunnelId,
        operation: &'static str,
        allowed: &[TunnelState],
    ) -> Result<(), PipelineError> {
        let state = self.state(id);
        if state == TunnelState::Undeclared {
            return Err(PipelineError::TunnelNotDeclared(id));
        }
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(PipelineError::InvalidTunnelState {
                id,
                operation,
                state,
            })
        }
    }

    /// Negotiates the tunnel. Both endpoints must exist. A failure leaves
    /// the previous state and is not retried.
    pub fn setup(
        &mut self,
        id: TunnelId,
        components: &ComponentRegistry,
        timeout: Duration,
    ) -> Result<(), PipelineError> {
        self.require_state(
            id,
            "set up",
            &[
                TunnelState::Declared,
                TunnelState::SetUp,
                TunnelState::Disabled,
                TunnelState::TornDown,
            ],
        )?;
        let (_, spec) = self.resolve(id, components)?;

        components
            .hardware()
            .setup_tunnel(&spec, timeout)
            .map_err(|source| PipelineError::TunnelSetupFailed { id, source })?;

        tracing::debug!(tunnel = %id, "tunnel set up");
        self.slots[id.slot()].state = TunnelState::SetUp;
        Ok(())
    }

    pub fn flush(&mut self, id: TunnelId, components: &ComponentRegistry) -> Result<(), PipelineError> {
        self.require_state(id, "flush", &[TunnelState::SetUp])?;
        let (_, spec) = self.resolve(id, components)?;
        components.hardware().flush_tunnel(&spec);
        tracing::debug!(tunnel = %id, "tunnel flushed");
        Ok(())
    }

    pub fn disable(
        &mut self,
        id: TunnelId,
        components: &ComponentRegistry,
    ) -> Result<(), PipelineError> {
        self.require_state(id, "disable", &[TunnelState::SetUp])?;
        let (_, spec) = self.resolve(id, components)?;
        components.hardware().disable_tunnel(&spec);
        self.slots[id.slot()].state = TunnelState::Disabled;
        tracing::debug!(tunnel = %id, "tunnel disabled");
        Ok(())
    }

    /// Releases a disabled tunnel. Neither endpoint may be executing.
    pub fn teardown(
        &mut self,
        id: TunnelId,
        components: &ComponentRegistry,
    ) -> Result<(), PipelineError> {
        self.require_state(id, "tear down", &[TunnelState::Disabled])?;
        let (decl, spec) = self.resolve(id, components)?;

        for role in [decl.source, decl.sink] {
            if components.state(role) == Some(ComponentState::Executing) {
                return Err(PipelineError::TunnelEndpointExecuting { id, role });
            }
        }

        components.hardware().teardown_tunnel(&spec);
        self.slots[id.slot()].state = TunnelState::TornDown;
        tracing::debug!(tunnel = %id, "tunnel torn down");
        Ok(())
    }
}
