use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        node::{AudioNode, NodeEvent},
        player::{Enqueued, PlayerSnapshot, SkipOutcome},
        registry::SessionRegistry,
    },
    bot::autojoin::{autojoin_target, ChannelCandidate},
    config::Config,
    error::DispatchError,
    sources::{MediaResolver, Track},
    voice::{BridgeOutput, ConnectOptions, GatewayEvent, VoiceBridge, VoiceGateway, VoiceLink},
};

/// Acciones de `/control`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pause,
    Resume,
    Skip,
    Stop,
    Leave,
}

impl Action {
    pub const ALL: [Action; 5] = [Action::Pause, Action::Resume, Action::Skip, Action::Stop, Action::Leave];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Skip => "skip",
            Action::Stop => "stop",
            Action::Leave => "leave",
        }
    }
}

impl FromStr for Action {
    type Err = DispatchError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let wanted = input.trim().to_lowercase();
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == wanted)
            .ok_or_else(|| DispatchError::InvalidAction(input.trim().to_string()))
    }
}

/// Qué pasó al ejecutar una [`Action`].
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    /// `false` si no había nada sonando que pausar.
    Paused(bool),
    /// `false` si no estaba en pausa.
    Resumed(bool),
    Skipped(SkipOutcome),
    Stopped { cleared: usize },
    Left,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub connect_options: ConnectOptions,
    pub connect_timeout: Duration,
    pub max_queue_size: usize,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_options: ConnectOptions {
                self_deaf: config.self_deaf,
                self_mute: false,
            },
            connect_timeout: config.voice_connect_timeout,
            max_queue_size: config.max_queue_size,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            connect_options: ConnectOptions {
                self_deaf: true,
                self_mute: false,
            },
            connect_timeout: Duration::from_secs(30),
            max_queue_size: 500,
        }
    }
}

/// Punto de entrada de los comandos: traduce cada intención del usuario a
/// operaciones sobre el registro, el adaptador de voz y los players.
///
/// Los comandos que mutan una sesión pasan por un carril por guild, así se
/// aplican en el orden en que llegaron aunque la resolución de pistas tarde.
/// Guilds distintas nunca se esperan entre sí.
pub struct Dispatcher {
    registry: SessionRegistry,
    voice: VoiceBridge,
    node: Arc<dyn AudioNode>,
    resolver: MediaResolver,
    settings: DispatchSettings,
    lanes: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl Dispatcher {
    pub fn new(
        bot_user_id: UserId,
        node: Arc<dyn AudioNode>,
        gateway: Arc<dyn VoiceGateway>,
        resolver: MediaResolver,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(node.clone(), settings.max_queue_size),
            voice: VoiceBridge::new(bot_user_id, gateway, node.clone()),
            node,
            resolver,
            settings,
            lanes: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn voice(&self) -> &VoiceBridge {
        &self.voice
    }

    fn lane(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.lanes.entry(guild_id).or_default().clone()
    }

    /// Entra al canal donde está quien invoca.
    pub async fn join(&self, guild_id: GuildId, user_channel: Option<ChannelId>) -> Result<VoiceLink, DispatchError> {
        let channel_id = user_channel.ok_or(DispatchError::NotInVoice)?;
        let lane = self.lane(guild_id);
        let _turn = lane.lock().await;

        if let Some(link) = self.voice.link(guild_id).filter(|l| l.channel_id == channel_id) {
            debug!("Ya conectado al canal {} en guild {}", channel_id, guild_id);
            self.registry.get_or_create(guild_id);
            return Ok(link);
        }

        self.connect(guild_id, channel_id).await
    }

    /// Lleva el bot a `channel_id`, cortando antes la conexión que hubiera.
    /// El player y su cola se conservan.
    pub async fn summon(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceLink, DispatchError> {
        let lane = self.lane(guild_id);
        let _turn = lane.lock().await;

        if self.voice.is_connected(guild_id) {
            self.voice.disconnect(guild_id, true).await?;
        }
        self.connect(guild_id, channel_id).await
    }

    /// Resuelve `query`, la busca en el nodo y encola la primera pista.
    ///
    /// Si el bot no está en voz se conecta al canal de quien invoca.
    pub async fn play(
        &self,
        guild_id: GuildId,
        query: &str,
        requester: UserId,
        user_channel: Option<ChannelId>,
    ) -> Result<Enqueued, DispatchError> {
        let url = self
            .resolver
            .resolve(query)
            .ok_or(DispatchError::UnresolvableReference)?;

        let lane = self.lane(guild_id);
        let _turn = lane.lock().await;

        if !self.voice.is_connected(guild_id) {
            let channel_id = user_channel.ok_or(DispatchError::NotInVoice)?;
            self.connect(guild_id, channel_id).await?;
        }

        let loaded = self
            .node
            .resolve_tracks(&url)
            .await?
            .into_iter()
            .next()
            .ok_or(DispatchError::LookupEmpty)?;

        let player = self.registry.get_or_create(guild_id);
        let outcome = player.enqueue(loaded.requested_by(requester)).await?;
        match &outcome {
            Enqueued::Started(track) => info!("▶️ Reproduciendo '{}' en guild {}", track.title(), guild_id),
            Enqueued::Queued { track, position } => {
                info!("➕ '{}' en cola (#{}) en guild {}", track.title(), position, guild_id)
            }
        }
        Ok(outcome)
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        self.registry.get(guild_id)?.now_playing().await
    }

    pub async fn list_queue(&self, guild_id: GuildId) -> Vec<Track> {
        match self.registry.get(guild_id) {
            Some(player) => player.snapshot().await.queue,
            None => Vec::new(),
        }
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Option<PlayerSnapshot> {
        Some(self.registry.get(guild_id)?.snapshot().await)
    }

    pub async fn control(&self, guild_id: GuildId, action: Action) -> Result<ControlOutcome, DispatchError> {
        let lane = self.lane(guild_id);
        let _turn = lane.lock().await;

        if action == Action::Leave {
            self.voice.disconnect(guild_id, true).await?;
            self.close_session(guild_id).await;
            return Ok(ControlOutcome::Left);
        }

        let Some(player) = self.registry.get(guild_id) else {
            debug!("Sin player en guild {}, {} no hace nada", guild_id, action.as_str());
            return Ok(match action {
                Action::Pause => ControlOutcome::Paused(false),
                Action::Resume => ControlOutcome::Resumed(false),
                Action::Skip => ControlOutcome::Skipped(SkipOutcome::NothingPlaying),
                Action::Stop | Action::Leave => ControlOutcome::Stopped { cleared: 0 },
            });
        };

        let outcome = match action {
            Action::Pause => ControlOutcome::Paused(player.pause().await?),
            Action::Resume => ControlOutcome::Resumed(player.resume().await?),
            Action::Skip => ControlOutcome::Skipped(player.skip().await?),
            Action::Stop => ControlOutcome::Stopped {
                cleared: player.stop().await?,
            },
            Action::Leave => ControlOutcome::Left,
        };
        Ok(outcome)
    }

    /// Igual que [`Dispatcher::control`] pero con la acción como texto.
    pub async fn control_str(&self, guild_id: GuildId, action: &str) -> Result<ControlOutcome, DispatchError> {
        let action = action.parse::<Action>()?;
        self.control(guild_id, action).await
    }

    /// Auto-join: entra al canal elegido si la guild aún no tiene conexión.
    pub async fn autojoin(
        &self,
        guild_id: GuildId,
        candidates: &[ChannelCandidate],
        preferred: Option<&str>,
    ) -> Result<Option<VoiceLink>, DispatchError> {
        if self.voice.is_connected(guild_id) {
            return Ok(None);
        }
        let Some(channel_id) = autojoin_target(candidates, preferred) else {
            debug!("Sin canal elegible para auto-join en guild {}", guild_id);
            return Ok(None);
        };

        let lane = self.lane(guild_id);
        let _turn = lane.lock().await;
        if self.voice.is_connected(guild_id) {
            return Ok(None);
        }

        let link = self.connect(guild_id, channel_id).await?;
        info!("🤖 Auto-join en guild {} (canal {})", guild_id, channel_id);
        Ok(Some(link))
    }

    /// Entrada de eventos de voz del gateway de Discord.
    pub async fn handle_gateway_event(&self, event: GatewayEvent) -> BridgeOutput {
        let output = match event {
            state @ GatewayEvent::StateUpdate { .. } => self.voice.on_voice_state_update(state).await,
            server @ GatewayEvent::ServerUpdate { .. } => self.voice.on_voice_server_update(server).await,
        };

        if let BridgeOutput::LinkClosed(guild_id) = output {
            warn!("🔌 El bot salió del canal de voz en guild {}", guild_id);
            let lane = self.lane(guild_id);
            let _turn = lane.lock().await;
            // Un join que tenía el turno pudo volver a conectar mientras tanto
            if self.voice.is_connected(guild_id) {
                info!("🔁 Guild {} ya tiene una conexión nueva, la sesión sigue", guild_id);
            } else {
                self.close_session(guild_id).await;
            }
        }
        output
    }

    /// Aplica un callback del nodo a su sesión.
    pub async fn handle_node_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::Ready { resumed: true } => info!("✅ Sesión del nodo reanudada"),
            NodeEvent::Ready { resumed: false } => self.recover_all().await,
            NodeEvent::Disconnected => {
                warn!("⚠️ Nodo de audio desconectado; las colas se conservan")
            }
            NodeEvent::TrackStart { guild_id, encoded } => {
                if let Some(player) = self.registry.get(guild_id) {
                    player.on_track_start(&encoded).await;
                }
            }
            NodeEvent::TrackEnd { guild_id, encoded, reason } => {
                let Some(player) = self.registry.get(guild_id) else { return };
                match player.on_track_end(&encoded, reason).await {
                    Ok(Some(next)) => info!("🎵 Siguiente en guild {}: {}", guild_id, next.title()),
                    Ok(None) => {}
                    Err(e) => error!("❌ No se pudo avanzar la cola en guild {}: {}", guild_id, e),
                }
            }
            NodeEvent::TrackStuck { guild_id, encoded, threshold } => {
                warn!("⚠️ Pista trabada {:?} en guild {}", threshold, guild_id);
                let Some(player) = self.registry.get(guild_id) else { return };
                if let Err(e) = player.on_track_stuck(&encoded).await {
                    error!("❌ No se pudo saltar la pista trabada en guild {}: {}", guild_id, e);
                }
            }
            NodeEvent::TrackException { guild_id, message, .. } => {
                // El nodo manda después un TrackEnd con loadFailed
                warn!("⚠️ Error reproduciendo en guild {}: {}", guild_id, message);
            }
            NodeEvent::VoiceClosed { guild_id, code, reason, by_remote } => {
                warn!(
                    "🔌 Voz del nodo cerrada en guild {} (código {}, remoto: {}): {}",
                    guild_id, code, by_remote, reason
                );
            }
        }
    }

    /// Tras una sesión nueva del nodo, cada player reenvía su estado.
    pub async fn recover_all(&self) {
        let players = self.registry.players();
        info!("🔄 Recuperando {} player(s) tras reconectar el nodo", players.len());

        for player in players {
            let guild_id = player.guild_id();
            if let Some(link) = self.voice.link(guild_id) {
                if let Err(e) = self.node.voice_update(guild_id, &link.voice).await {
                    warn!("No se pudo reenviar la voz de guild {}: {}", guild_id, e);
                    continue;
                }
            }
            if let Err(e) = player.recover().await {
                warn!("No se pudo recuperar el player de guild {}: {}", guild_id, e);
            }
        }
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceLink, DispatchError> {
        let link = self
            .voice
            .connect(
                guild_id,
                channel_id,
                self.settings.connect_options,
                self.settings.connect_timeout,
            )
            .await?;
        self.registry.get_or_create(guild_id);
        Ok(link)
    }

    /// Cierra la sesión: detiene y quita el player y libera el del nodo.
    async fn close_session(&self, guild_id: GuildId) {
        if let Some(player) = self.registry.remove(guild_id) {
            if let Err(e) = player.stop().await {
                debug!("Stop al cerrar sesión en guild {}: {}", guild_id, e);
            }
        }
        if let Err(e) = self.node.destroy(guild_id).await {
            debug!("No se pudo liberar el player del nodo en guild {}: {}", guild_id, e);
        }
        self.release_lane(guild_id);
        info!("🗑️ Sesión cerrada en guild {}", guild_id);
    }

    /// Quita el carril de la guild si solo lo tiene quien cierra la sesión.
    ///
    /// Con alguien más esperando turno el carril se conserva, así nunca hay
    /// dos carriles vivos para la misma guild.
    fn release_lane(&self, guild_id: GuildId) {
        // Una referencia del mapa y otra del llamador
        self.lanes.remove_if(&guild_id, |_, lane| Arc::strong_count(lane) <= 2);
    }
}
