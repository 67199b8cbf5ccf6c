//! Port numbers, the default tunnel graph and the port settings table.

use std::collections::HashSet;

use crate::component::ComponentRole;
use crate::error::PipelineError;
use crate::tunnel::{TunnelDecl, TunnelId, TunnelManager};

/// Clock output feeding the video scheduler.
pub const CLOCK_VIDEO_PORT: u32 = 80;
/// Clock output feeding the audio render.
pub const CLOCK_AUDIO_PORT: u32 = 81;
/// Video decoder input.
pub const DECODER_INPUT_PORT: u32 = 130;
/// Video decoder output.
pub const DECODER_OUTPUT_PORT: u32 = 131;
/// Video effects input.
pub const FX_INPUT_PORT: u32 = 190;
/// Video effects output.
pub const FX_OUTPUT_PORT: u32 = 191;
/// Video scheduler input.
pub const SCHEDULER_INPUT_PORT: u32 = 10;
/// Video scheduler output.
pub const SCHEDULER_OUTPUT_PORT: u32 = 11;
/// Video scheduler clock input.
pub const SCHEDULER_CLOCK_PORT: u32 = 12;
/// Video render input.
pub const RENDER_INPUT_PORT: u32 = 90;
/// Audio render input.
pub const AUDIO_RENDER_INPUT_PORT: u32 = 100;
/// Audio render clock input.
pub const AUDIO_RENDER_CLOCK_PORT: u32 = 101;
/// Wildcard port index.
pub const ALL_PORTS: u32 = 0xFFFF_FFFF;

/// The tunnel graph declared at init.
pub const DEFAULT_TUNNELS: [TunnelDecl; 5] = [
    TunnelDecl {
        id: TunnelId::DecoderToFx,
        source: ComponentRole::Decoder,
        source_port: DECODER_OUTPUT_PORT,
        sink: ComponentRole::Fx,
        sink_port: FX_INPUT_PORT,
    },
    TunnelDecl {
        id: TunnelId::FxToScheduler,
        source: ComponentRole::Fx,
        source_port: FX_OUTPUT_PORT,
        sink: ComponentRole::Scheduler,
        sink_port: SCHEDULER_INPUT_PORT,
    },
    TunnelDecl {
        id: TunnelId::SchedulerToRender,
        source: ComponentRole::Scheduler,
        source_port: SCHEDULER_OUTPUT_PORT,
        sink: ComponentRole::Render,
        sink_port: RENDER_INPUT_PORT,
    },
    TunnelDecl {
        id: TunnelId::ClockToScheduler,
        source: ComponentRole::Clock,
        source_port: CLOCK_VIDEO_PORT,
        sink: ComponentRole::Scheduler,
        sink_port: SCHEDULER_CLOCK_PORT,
    },
    TunnelDecl {
        id: TunnelId::ClockToAudioRender,
        source: ComponentRole::Clock,
        source_port: CLOCK_AUDIO_PORT,
        sink: ComponentRole::AudioRender,
        sink_port: AUDIO_RENDER_CLOCK_PORT,
    },
];

/// What to do when the hardware reports new settings on an output port:
/// set up the tunnel leaving that port, then start its downstream component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAction {
    /// Output port that changed.
    pub port: u32,
    /// Tunnel to (re)negotiate.
    pub tunnel: TunnelId,
    /// Component to move to executing afterwards.
    pub enable: ComponentRole,
}

/// Structural reactions to port settings changes.
pub const PORT_SETTINGS_ACTIONS: [PortAction; 2] = [
    PortAction {
        port: FX_OUTPUT_PORT,
        tunnel: TunnelId::FxToScheduler,
        enable: ComponentRole::Scheduler,
    },
    PortAction {
        port: SCHEDULER_OUTPUT_PORT,
        tunnel: TunnelId::SchedulerToRender,
        enable: ComponentRole::Render,
    },
];

/// A port action table checked against the declared tunnel graph.
#[derive(Debug, Clone)]
pub(crate) struct PortTable {
    actions: Vec<PortAction>,
}

impl PortTable {
    /// Checks that every action names a declared tunnel leaving its port and
    /// enables that tunnel's sink, and that no port appears twice.
    pub fn validate(actions: &[PortAction], tunnels: &TunnelManager) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();

        for action in actions {
            if !seen.insert(action.port) {
                return Err(PipelineError::InvalidPortTable {
                    reason: format!("port {} listed twice", action.port),
                });
            }

            let decl = tunnels
                .declaration(action.tunnel)
                .ok_or_else(|| PipelineError::InvalidPortTable {
                    reason: format!("tunnel {} is not declared", action.tunnel),
                })?;

            if decl.source_port != action.port {
                return Err(PipelineError::InvalidPortTable {
                    reason: format!(
                        "port {} is not the source of tunnel {} (source port {})",
                        action.port, action.tunnel, decl.source_port
                    ),
                });
            }

            if decl.sink != action.enable {
                return Err(PipelineError::InvalidPortTable {
                    reason: format!(
                        "port {} enables {} but tunnel {} feeds {}",
                        action.port, action.enable, action.tunnel, decl.sink
                    ),
                });
            }
        }

        Ok(Self {
            actions: actions.to_vec(),
        })
    }

    pub fn lookup(&self, port: u32) -> Option<PortAction> {
        self.actions.iter().copied().find(|action| action.port == port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared() -> TunnelManager {
        let mut tunnels = TunnelManager::new();
        for decl in DEFAULT_TUNNELS {
            tunnels.declare(decl).unwrap();
        }
        tunnels
    }

    #[test]
    fn test_default_table_is_valid() {
        let table = PortTable::validate(&PORT_SETTINGS_ACTIONS, &declared()).unwrap();

        let action = table.lookup(FX_OUTPUT_PORT).unwrap();
        assert_eq!(action.tunnel, TunnelId::FxToScheduler);
        assert_eq!(action.enable, ComponentRole::Scheduler);

        let action = table.lookup(SCHEDULER_OUTPUT_PORT).unwrap();
        assert_eq!(action.tunnel, TunnelId::SchedulerToRender);
        assert_eq!(action.enable, ComponentRole::Render);

        assert!(table.lookup(DECODER_OUTPUT_PORT).is_none());
    }

    #[test]
    fn test_duplicate_port_rejected() {
        let actions = [PORT_SETTINGS_ACTIONS[0], PORT_SETTINGS_ACTIONS[0]];
        let err = PortTable::validate(&actions, &declared()).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_undeclared_tunnel_rejected() {
        let err = PortTable::validate(&PORT_SETTINGS_ACTIONS, &TunnelManager::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPortTable { .. }));
    }

    #[test]
    fn test_wrong_source_port_rejected() {
        let actions = [PortAction {
            port: SCHEDULER_OUTPUT_PORT,
            tunnel: TunnelId::FxToScheduler,
            enable: ComponentRole::Scheduler,
        }];
        let err = PortTable::validate(&actions, &declared()).unwrap_err();
        assert!(err.to_string().contains("not the source"));
    }

    #[test]
    fn test_wrong_enabled_role_rejected() {
        let actions = [PortAction {
            port: FX_OUTPUT_PORT,
            tunnel: TunnelId::FxToScheduler,
            enable: ComponentRole::Render,
        }];
        let err = PortTable::validate(&actions, &declared()).unwrap_err();
        assert!(err.to_string().contains("feeds"));
    }
}
