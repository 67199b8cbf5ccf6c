//! Error types for omx-pipeline.
//!
//! Errors are split into two categories:
//! - **Structural errors** ([`PipelineError`]): a component, tunnel or state
//!   transition could not be brought up. During [`init`](crate::PipelineBuilder::init)
//!   these are fatal to the session.
//! - **Hardware RPC errors** ([`HardwareError`]): a single get/set call on a
//!   component failed. These are logged and the pipeline carries on with the
//!   previous state.

use std::fmt;

use crate::component::{ComponentRole, ComponentState};
use crate::tunnel::{TunnelId, TunnelState};

/// First code of the contiguous standard error range.
const STANDARD_ERROR_BASE: u32 = 0x8000_1000;

/// Names of the standard error range, indexed by `code - STANDARD_ERROR_BASE`.
static STANDARD_ERROR_NAMES: [&str; 37] = [
    "InsufficientResources",
    "Undefined",
    "InvalidComponentName",
    "ComponentNotFound",
    "InvalidComponent",
    "BadParameter",
    "NotImplemented",
    "Underflow",
    "Overflow",
    "Hardware",
    "InvalidState",
    "StreamCorrupt",
    "PortsNotCompatible",
    "ResourcesLost",
    "NoMore",
    "VersionMismatch",
    "NotReady",
    "Timeout",
    "SameState",
    "ResourcesPreempted",
    "PortUnresponsiveDuringAllocation",
    "PortUnresponsiveDuringDeallocation",
    "PortUnresponsiveDuringStop",
    "IncorrectStateTransition",
    "IncorrectStateOperation",
    "UnsupportedSetting",
    "UnsupportedIndex",
    "BadPortIndex",
    "PortUnpopulated",
    "ComponentSuspended",
    "DynamicResourcesUnavailable",
    "MbErrorsInFrame",
    "FormatNotDetected",
    "ContentPipeOpenFailed",
    "ContentPipeCreationFailed",
    "SeperateTablesUsed",
    "TunnelingUnsupported",
];

/// Extension and vendor codes outside the standard range.
static EXTENSION_ERROR_NAMES: [(u32, &str); 7] = [
    (0x8F00_0000, "KhronosExtensions"),
    (0x9000_0000, "VendorStartUnused"),
    (0x9000_0001, "DiskFull"),
    (0x9000_0002, "MaxFileSize"),
    (0x9000_0003, "DrmUnauthorised"),
    (0x9000_0004, "DrmExpired"),
    (0x9000_0005, "DrmGeneral"),
];

/// A raw error code reported by a hardware component.
///
/// The code is kept as reported; [`ErrorCode::name`] decodes it for
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    /// No error.
    pub const NONE: Self = Self(0);
    /// Resources could not be allocated.
    pub const INSUFFICIENT_RESOURCES: Self = Self(0x8000_1000);
    /// Unspecified failure.
    pub const UNDEFINED: Self = Self(0x8000_1001);
    /// A parameter was rejected.
    pub const BAD_PARAMETER: Self = Self(0x8000_1005);
    /// Two ports could not agree on a format.
    pub const PORTS_NOT_COMPATIBLE: Self = Self(0x8000_100C);
    /// The component did not answer in time.
    pub const TIMEOUT: Self = Self(0x8000_1011);
    /// The component was already in the requested state.
    pub const SAME_STATE: Self = Self(0x8000_1012);
    /// The requested state transition is not allowed.
    pub const INCORRECT_STATE_TRANSITION: Self = Self(0x8000_1017);
    /// The config or parameter index is not supported.
    pub const UNSUPPORTED_INDEX: Self = Self(0x8000_101A);

    /// Returns the symbolic name of this code, or `"unknown"`.
    pub fn name(self) -> &'static str {
        if self.0 == 0 {
            return "None";
        }
        if let Some(index) = self.0.checked_sub(STANDARD_ERROR_BASE) {
            if let Some(name) = STANDARD_ERROR_NAMES.get(index as usize) {
                return name;
            }
        }
        EXTENSION_ERROR_NAMES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map_or("unknown", |(_, name)| name)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08x})", self.name(), self.0)
    }
}

/// A single hardware call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    /// The component returned an error code.
    #[error("hardware error: {0}")]
    Code(ErrorCode),

    /// The component did not acknowledge a command in time.
    #[error("timed out waiting for hardware acknowledgement")]
    Timeout,

    /// No component handle exists for the role.
    #[error("no {0} component")]
    NoHandle(ComponentRole),
}

impl From<ErrorCode> for HardwareError {
    fn from(code: ErrorCode) -> Self {
        Self::Code(code)
    }
}

/// Structural pipeline failures.
///
/// These are returned from component, tunnel and bring-up operations. A
/// failure during [`PipelineBuilder::init()`] means the pipeline is not
/// usable.
///
/// [`PipelineBuilder::init()`]: crate::PipelineBuilder::init
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A handle for this role already exists.
    #[error("{role} component already exists")]
    ComponentExists {
        /// Role of the existing component.
        role: ComponentRole,
    },

    /// The operation needs a component that has not been created.
    #[error("{role} component does not exist")]
    ComponentMissing {
        /// Role of the missing component.
        role: ComponentRole,
    },

    /// The hardware refused to create the component.
    #[error("failed to create {role} component: {source}")]
    ComponentCreateFailed {
        /// Role that was being created.
        role: ComponentRole,
        /// Hardware failure.
        #[source]
        source: HardwareError,
    },

    /// The hardware rejected or did not acknowledge a state change.
    #[error("{role}: state change to {to} failed: {source}")]
    StateChangeFailed {
        /// Component role.
        role: ComponentRole,
        /// Requested state.
        to: ComponentState,
        /// Hardware failure.
        #[source]
        source: HardwareError,
    },

    /// The tunnel has never been declared.
    #[error("tunnel {0} is not declared")]
    TunnelNotDeclared(TunnelId),

    /// The tunnel is already declared and in use.
    #[error("tunnel {id} is already declared ({state})")]
    TunnelAlreadyDeclared {
        /// Tunnel id.
        id: TunnelId,
        /// Its current state.
        state: TunnelState,
    },

    /// One of the tunnel endpoints has no component handle.
    #[error("tunnel {id}: endpoint {role} does not exist")]
    TunnelEndpointMissing {
        /// Tunnel id.
        id: TunnelId,
        /// Missing endpoint.
        role: ComponentRole,
    },

    /// The tunnel operation is not valid in the tunnel's current state.
    #[error("tunnel {id}: cannot {operation} while {state}")]
    InvalidTunnelState {
        /// Tunnel id.
        id: TunnelId,
        /// Attempted operation.
        operation: &'static str,
        /// Current state.
        state: TunnelState,
    },

    /// An endpoint is still executing, so the tunnel cannot be torn down.
    #[error("tunnel {id}: {role} is still executing")]
    TunnelEndpointExecuting {
        /// Tunnel id.
        id: TunnelId,
        /// Executing endpoint.
        role: ComponentRole,
    },

    /// Format or resource negotiation between the two ports failed.
    #[error("tunnel {id} setup failed: {source}")]
    TunnelSetupFailed {
        /// Tunnel id.
        id: TunnelId,
        /// Hardware failure.
        #[source]
        source: HardwareError,
    },

    /// A port flush was rejected or not acknowledged.
    #[error("{role}: flush of port {port} failed: {source}")]
    FlushFailed {
        /// Component role.
        role: ComponentRole,
        /// Port that was flushed.
        port: u32,
        /// Hardware failure.
        #[source]
        source: HardwareError,
    },

    /// Port buffers could not be enabled.
    #[error("{role}: enabling buffers on port {port} failed: {source}")]
    PortBuffersFailed {
        /// Component role.
        role: ComponentRole,
        /// Port whose buffers were requested.
        port: u32,
        /// Hardware failure.
        #[source]
        source: HardwareError,
    },

    /// The port action table is inconsistent with the tunnel graph.
    #[error("invalid port table: {reason}")]
    InvalidPortTable {
        /// What is wrong with the table.
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Which value is wrong.
        reason: String,
    },

    /// The event dispatcher thread could not be started.
    #[error("failed to spawn event dispatcher: {0}")]
    DispatcherSpawn(#[source] std::io::Error),

    /// The pipeline has been deinitialized.
    #[error("pipeline is not running")]
    NotRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_standard_names() {
        assert_eq!(ErrorCode::INSUFFICIENT_RESOURCES.name(), "InsufficientResources");
        assert_eq!(ErrorCode(0x8000_1024).name(), "TunnelingUnsupported");
        assert_eq!(ErrorCode::SAME_STATE.name(), "SameState");
        assert_eq!(ErrorCode::NONE.name(), "None");
    }

    #[test]
    fn test_error_code_extension_names() {
        assert_eq!(ErrorCode(0x9000_0001).name(), "DiskFull");
        assert_eq!(ErrorCode(0x8F00_0000).name(), "KhronosExtensions");
    }

    #[test]
    fn test_error_code_unknown() {
        assert_eq!(ErrorCode(0x8000_1025).name(), "unknown");
        assert_eq!(ErrorCode(42).name(), "unknown");
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::TIMEOUT.to_string(), "Timeout (0x80001011)");
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::ComponentExists {
            role: ComponentRole::Clock,
        };
        assert_eq!(err.to_string(), "clock component already exists");

        let err = PipelineError::TunnelSetupFailed {
            id: TunnelId::ClockToAudioRender,
            source: HardwareError::Code(ErrorCode::PORTS_NOT_COMPATIBLE),
        };
        assert!(err.to_string().contains("PortsNotCompatible"));
    }
}
