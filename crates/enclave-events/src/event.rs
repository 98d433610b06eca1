//! Event types for the Enclave event bus.

use chrono::{DateTime, Utc};
use enclave_core::{Origin, PluginId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Source component that generated the event.
    pub source: String,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// All events published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnclaveEvent {
    // ========== Plugin Lifecycle ==========
    /// A plugin runtime acknowledged its code and is serving requests.
    PluginStarted {
        /// Event metadata.
        metadata: EventMetadata,
        /// Plugin ID.
        plugin_id: PluginId,
    },

    /// A plugin runtime was torn down on request.
    PluginTerminated {
        /// Event metadata.
        metadata: EventMetadata,
        /// Plugin ID.
        plugin_id: PluginId,
    },

    /// A plugin runtime's channel closed without a termination request.
    PluginCrashed {
        /// Event metadata.
        metadata: EventMetadata,
        /// Plugin ID.
        plugin_id: PluginId,
        /// What the supervisor observed.
        reason: String,
    },

    // ========== Session Events ==========
    /// A multichain session was stored for an origin.
    SessionCreated {
        /// Event metadata.
        metadata: EventMetadata,
        /// The origin owning the session.
        origin: Origin,
        /// Plugins bound by the session.
        plugins: Vec<PluginId>,
    },

    /// A multichain session was removed.
    SessionClosed {
        /// Event metadata.
        metadata: EventMetadata,
        /// The origin that owned the session.
        origin: Origin,
    },
}

impl EnclaveEvent {
    /// Get the event metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::PluginStarted { metadata, .. }
            | Self::PluginTerminated { metadata, .. }
            | Self::PluginCrashed { metadata, .. }
            | Self::SessionCreated { metadata, .. }
            | Self::SessionClosed { metadata, .. } => metadata,
        }
    }

    /// Get the event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PluginStarted { .. } => "plugin_started",
            Self::PluginTerminated { .. } => "plugin_terminated",
            Self::PluginCrashed { .. } => "plugin_crashed",
            Self::SessionCreated { .. } => "session_created",
            Self::SessionClosed { .. } => "session_closed",
        }
    }

    /// The plugin this event concerns, if it concerns exactly one.
    #[must_use]
    pub fn plugin_id(&self) -> Option<&PluginId> {
        match self {
            Self::PluginStarted { plugin_id, .. }
            | Self::PluginTerminated { plugin_id, .. }
            | Self::PluginCrashed { plugin_id, .. } => Some(plugin_id),
            Self::SessionCreated { .. } | Self::SessionClosed { .. } => None,
        }
    }
}
