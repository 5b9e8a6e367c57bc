use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::GuildId;
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::sources::{LoadedTrack, Track};

#[derive(Debug, Error)]
pub enum NodeError {
    /// Sin conexión o sin sesión con el nodo.
    #[error("nodo de audio no disponible: {0}")]
    Unavailable(String),
    /// El nodo no pudo cargar la URL pedida.
    #[error("no se pudo cargar la pista: {0}")]
    LoadFailed(String),
    #[error("el nodo rechazó la petición ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl From<reqwest::Error> for NodeError {
    fn from(error: reqwest::Error) -> Self {
        NodeError::Unavailable(error.to_string())
    }
}

/// Datos de la sesión de voz que el nodo necesita para unirse al canal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceServerInfo {
    pub session_id: String,
    pub token: String,
    pub endpoint: String,
}

/// Motivo con el que el nodo reporta el fin de una pista.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Solo un final natural (o fallido) avanza la cola.
    pub fn may_start_next(self) -> bool {
        matches!(self, TrackEndReason::Finished | TrackEndReason::LoadFailed)
    }
}

/// Callbacks asíncronos del nodo, en orden de emisión.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Ready { resumed: bool },
    TrackStart { guild_id: GuildId, encoded: String },
    TrackEnd { guild_id: GuildId, encoded: String, reason: TrackEndReason },
    TrackException { guild_id: GuildId, encoded: String, message: String },
    TrackStuck { guild_id: GuildId, encoded: String, threshold: Duration },
    VoiceClosed { guild_id: GuildId, code: u16, reason: String, by_remote: bool },
    Disconnected,
}

impl NodeEvent {
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            NodeEvent::TrackStart { guild_id, .. }
            | NodeEvent::TrackEnd { guild_id, .. }
            | NodeEvent::TrackException { guild_id, .. }
            | NodeEvent::TrackStuck { guild_id, .. }
            | NodeEvent::VoiceClosed { guild_id, .. } => Some(*guild_id),
            NodeEvent::Ready { .. } | NodeEvent::Disconnected => None,
        }
    }
}

/// Cliente de un nodo remoto de decodificación.
///
/// Los comandos de control son fire-and-acknowledge: `Ok` significa que el nodo
/// aceptó la orden, el cambio real llega después como [`NodeEvent`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AudioNode: Send + Sync {
    /// Una lista vacía no es un error: no hay nada reproducible en esa URL.
    async fn resolve_tracks(&self, url: &str) -> Result<Vec<LoadedTrack>, NodeError>;

    /// Reproduce `track` reemplazando la actual y quitando la pausa.
    async fn play(&self, guild_id: GuildId, track: &Track) -> Result<(), NodeError>;

    async fn pause(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError>;

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError>;

    async fn voice_update(&self, guild_id: GuildId, voice: &VoiceServerInfo) -> Result<(), NodeError>;

    /// Libera el player del nodo para esa guild.
    async fn destroy(&self, guild_id: GuildId) -> Result<(), NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_natural_endings_advance() {
        assert!(TrackEndReason::Finished.may_start_next());
        assert!(TrackEndReason::LoadFailed.may_start_next());
        assert!(!TrackEndReason::Stopped.may_start_next());
        assert!(!TrackEndReason::Replaced.may_start_next());
        assert!(!TrackEndReason::Cleanup.may_start_next());
    }

    #[test]
    fn test_reason_deserializes_from_wire_names() {
        let reason: TrackEndReason = serde_json::from_str("\"loadFailed\"").unwrap();
        assert_eq!(reason, TrackEndReason::LoadFailed);
    }
}
