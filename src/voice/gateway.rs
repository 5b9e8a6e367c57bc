use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{error::JoinError, Songbird};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::audio::node::VoiceServerInfo;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("el gateway no respondió a tiempo")]
    TimedOut,
    #[error("no hay conexión de voz activa")]
    NotConnected,
    #[error("{0}")]
    Rejected(String),
}

impl From<JoinError> for GatewayError {
    fn from(error: JoinError) -> Self {
        match error {
            JoinError::TimedOut => GatewayError::TimedOut,
            JoinError::NoCall => GatewayError::NotConnected,
            other => GatewayError::Rejected(other.to_string()),
        }
    }
}

/// Estado propio con el que el bot entra al canal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectOptions {
    pub self_deaf: bool,
    pub self_mute: bool,
}

/// Operaciones de voz a nivel gateway de Discord.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Mueve el bot a `channel_id` y espera a que el gateway entregue los datos
    /// de la sesión de voz.
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        options: ConnectOptions,
    ) -> Result<VoiceServerInfo, GatewayError>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), GatewayError>;
}

/// Gateway respaldado por songbird en modo solo-gateway: songbird negocia con
/// Discord y el audio lo envía el nodo.
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        options: ConnectOptions,
    ) -> Result<VoiceServerInfo, GatewayError> {
        let (connection, call) = self.manager.join_gateway(guild_id, channel_id).await?;

        {
            let mut call = call.lock().await;
            if options.self_deaf {
                call.deafen(true).await?;
            }
            if options.self_mute {
                call.mute(true).await?;
            }
        }

        info!("🔊 Gateway de voz listo en guild {} (canal {})", guild_id, channel_id);
        Ok(VoiceServerInfo {
            session_id: connection.session_id,
            token: connection.token,
            endpoint: connection.endpoint,
        })
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), GatewayError> {
        match self.manager.remove(guild_id).await {
            Ok(()) => Ok(()),
            Err(JoinError::NoCall) => {
                debug!("No había llamada que cerrar en guild {}", guild_id);
                Err(GatewayError::NotConnected)
            }
            Err(e) => Err(e.into()),
        }
    }
}
