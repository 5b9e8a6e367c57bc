use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    audio::node::{AudioNode, NodeError, VoiceServerInfo},
    voice::gateway::{ConnectOptions, GatewayError, VoiceGateway},
};

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("tiempo de espera agotado al conectar a voz")]
    ConnectTimeout,
    #[error("conexión de voz rechazada: {0}")]
    ConnectDenied(String),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Conexión activa de una guild con el gateway de voz, puenteada al nodo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceLink {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub voice: VoiceServerInfo,
}

/// Eventos de voz tal como llegan del gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    StateUpdate {
        guild_id: GuildId,
        user_id: UserId,
        channel_id: Option<ChannelId>,
        session_id: String,
    },
    ServerUpdate {
        guild_id: GuildId,
        token: String,
        endpoint: Option<String>,
    },
}

impl GatewayEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            GatewayEvent::StateUpdate { guild_id, .. }
            | GatewayEvent::ServerUpdate { guild_id, .. } => *guild_id,
        }
    }
}

/// Resultado de procesar un [`GatewayEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutput {
    /// Hay datos de voz nuevos que el nodo debe recibir.
    Forward(GuildId, VoiceServerInfo),
    /// El bot salió (o lo sacaron) del canal de una conexión registrada.
    LinkClosed(GuildId),
    Ignored,
}

/// Piezas de la negociación de voz que van llegando por separado.
#[derive(Debug, Clone, Default)]
struct PendingVoice {
    channel_id: Option<ChannelId>,
    session_id: Option<String>,
    token: Option<String>,
    endpoint: Option<String>,
}

impl PendingVoice {
    fn complete(&self) -> Option<VoiceServerInfo> {
        Some(VoiceServerInfo {
            session_id: self.session_id.clone()?,
            token: self.token.clone()?,
            endpoint: self.endpoint.clone()?,
        })
    }
}

/// Adaptador entre el gateway de voz de Discord y el nodo de audio.
///
/// Dueño del ciclo connect/disconnect de la única [`VoiceLink`] por guild.
pub struct VoiceBridge {
    bot_user_id: UserId,
    gateway: Arc<dyn VoiceGateway>,
    node: Arc<dyn AudioNode>,
    links: DashMap<GuildId, VoiceLink>,
    pending: DashMap<GuildId, PendingVoice>,
}

impl VoiceBridge {
    pub fn new(bot_user_id: UserId, gateway: Arc<dyn VoiceGateway>, node: Arc<dyn AudioNode>) -> Self {
        Self {
            bot_user_id,
            gateway,
            node,
            links: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    /// Entra a `channel_id` y entrega la sesión de voz al nodo.
    ///
    /// Si algo falla (timeout, rechazo del gateway o del nodo) el intento se
    /// descarta y no queda ninguna conexión registrada.
    pub async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        options: ConnectOptions,
        timeout: Duration,
    ) -> Result<VoiceLink, VoiceError> {
        info!("🔌 Conectando a canal {} en guild {}", channel_id, guild_id);

        let joined = tokio::time::timeout(timeout, self.gateway.join(guild_id, channel_id, options)).await;
        let voice = match joined {
            Ok(Ok(voice)) => voice,
            Ok(Err(GatewayError::TimedOut)) | Err(_) => {
                warn!("⏰ Timeout conectando a voz en guild {}", guild_id);
                self.discard(guild_id).await;
                return Err(VoiceError::ConnectTimeout);
            }
            Ok(Err(e)) => {
                warn!("❌ Conexión de voz rechazada en guild {}: {}", guild_id, e);
                self.discard(guild_id).await;
                return Err(VoiceError::ConnectDenied(e.to_string()));
            }
        };

        if let Err(e) = self.node.voice_update(guild_id, &voice).await {
            error!("❌ El nodo no aceptó la sesión de voz de guild {}: {}", guild_id, e);
            self.discard(guild_id).await;
            return Err(e.into());
        }

        self.pending.insert(
            guild_id,
            PendingVoice {
                channel_id: Some(channel_id),
                session_id: Some(voice.session_id.clone()),
                token: Some(voice.token.clone()),
                endpoint: Some(voice.endpoint.clone()),
            },
        );
        let link = VoiceLink {
            guild_id,
            channel_id,
            voice,
        };
        self.links.insert(guild_id, link.clone());
        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(link)
    }

    /// Sale del canal de voz. Con `force` nunca falla.
    pub async fn disconnect(&self, guild_id: GuildId, force: bool) -> Result<(), VoiceError> {
        self.links.remove(&guild_id);
        self.pending.remove(&guild_id);

        match self.gateway.leave(guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) if force => {
                debug!("Desconexión forzada en guild {} ignoró: {}", guild_id, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn link(&self, guild_id: GuildId) -> Option<VoiceLink> {
        self.links.get(&guild_id).map(|l| l.clone())
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.links.contains_key(&guild_id)
    }

    pub async fn on_voice_state_update(&self, event: GatewayEvent) -> BridgeOutput {
        self.dispatch(event).await
    }

    pub async fn on_voice_server_update(&self, event: GatewayEvent) -> BridgeOutput {
        self.dispatch(event).await
    }

    async fn dispatch(&self, event: GatewayEvent) -> BridgeOutput {
        let output = self.apply(event);
        if let BridgeOutput::Forward(guild_id, voice) = &output {
            debug!("📡 Reenviando actualización de voz al nodo para guild {}", guild_id);
            if let Err(e) = self.node.voice_update(*guild_id, voice).await {
                error!("❌ Error reenviando voz de guild {}: {}", guild_id, e);
            }
        }
        output
    }

    /// Paso síncrono del pipeline: actualiza el estado y decide qué emitir.
    pub fn apply(&self, event: GatewayEvent) -> BridgeOutput {
        let guild_id = event.guild_id();

        match event {
            GatewayEvent::StateUpdate { user_id, .. } if user_id != self.bot_user_id => {
                BridgeOutput::Ignored
            }
            GatewayEvent::StateUpdate {
                channel_id: None, ..
            } => {
                self.pending.remove(&guild_id);
                match self.links.remove(&guild_id) {
                    Some(_) => {
                        warn!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
                        BridgeOutput::LinkClosed(guild_id)
                    }
                    None => BridgeOutput::Ignored,
                }
            }
            GatewayEvent::StateUpdate {
                channel_id: Some(channel_id),
                session_id,
                ..
            } => {
                let mut pending = self.pending.entry(guild_id).or_default();
                pending.channel_id = Some(channel_id);
                pending.session_id = Some(session_id);
                let snapshot = pending.clone();
                drop(pending);
                self.reconcile(guild_id, snapshot)
            }
            GatewayEvent::ServerUpdate { endpoint: None, .. } => {
                // Discord avisa que el servidor de voz cambia; llegará otro update
                debug!("Servidor de voz sin endpoint en guild {}", guild_id);
                BridgeOutput::Ignored
            }
            GatewayEvent::ServerUpdate {
                token,
                endpoint: Some(endpoint),
                ..
            } => {
                let mut pending = self.pending.entry(guild_id).or_default();
                pending.token = Some(token);
                pending.endpoint = Some(endpoint);
                let snapshot = pending.clone();
                drop(pending);
                self.reconcile(guild_id, snapshot)
            }
        }
    }

    /// Solo reenvía a conexiones registradas y solo si algo cambió.
    fn reconcile(&self, guild_id: GuildId, pending: PendingVoice) -> BridgeOutput {
        let Some(voice) = pending.complete() else {
            return BridgeOutput::Ignored;
        };
        let Some(mut link) = self.links.get_mut(&guild_id) else {
            return BridgeOutput::Ignored;
        };

        if let Some(channel_id) = pending.channel_id {
            link.channel_id = channel_id;
        }
        if link.voice == voice {
            return BridgeOutput::Ignored;
        }

        link.voice = voice.clone();
        BridgeOutput::Forward(guild_id, voice)
    }

    async fn discard(&self, guild_id: GuildId) {
        self.links.remove(&guild_id);
        self.pending.remove(&guild_id);
        if let Err(e) = self.gateway.leave(guild_id).await {
            debug!("Descartando conexión de guild {}: {}", guild_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::node::MockAudioNode;
    use crate::testing::{voice_info, FakeGateway, GatewayCall, JoinBehavior, NodeCall, RecordingNode};
    use crate::voice::gateway::MockVoiceGateway;
    use pretty_assertions::assert_eq;

    const BOT: u64 = 999;

    fn guild() -> GuildId {
        GuildId::new(10)
    }

    fn channel() -> ChannelId {
        ChannelId::new(20)
    }

    fn state(user: u64, channel_id: Option<ChannelId>, session: &str) -> GatewayEvent {
        GatewayEvent::StateUpdate {
            guild_id: guild(),
            user_id: UserId::new(user),
            channel_id,
            session_id: session.to_string(),
        }
    }

    fn server(token: &str, endpoint: &str) -> GatewayEvent {
        GatewayEvent::ServerUpdate {
            guild_id: guild(),
            token: token.to_string(),
            endpoint: Some(endpoint.to_string()),
        }
    }

    async fn connected_bridge() -> (VoiceBridge, Arc<RecordingNode>) {
        let node = RecordingNode::new();
        let gateway = FakeGateway::new(JoinBehavior::Accept(voice_info("s1")));
        let bridge = VoiceBridge::new(UserId::new(BOT), gateway, node.clone());
        bridge
            .connect(guild(), channel(), ConnectOptions::default(), Duration::from_secs(1))
            .await
            .unwrap();
        (bridge, node)
    }

    #[tokio::test]
    async fn test_connect_registers_link_and_hands_off_to_node() {
        let (bridge, node) = connected_bridge().await;

        assert_eq!(
            bridge.link(guild()),
            Some(VoiceLink {
                guild_id: guild(),
                channel_id: channel(),
                voice: voice_info("s1"),
            })
        );
        assert_eq!(node.calls(), vec![NodeCall::Voice(guild(), voice_info("s1"))]);
    }

    #[tokio::test]
    async fn test_connect_timeout_leaves_nothing_registered() {
        let node = RecordingNode::new();
        let gateway = FakeGateway::new(JoinBehavior::Hang);
        let bridge = VoiceBridge::new(UserId::new(BOT), gateway.clone(), node.clone());

        let result = bridge
            .connect(guild(), channel(), ConnectOptions::default(), Duration::from_millis(50))
            .await;

        assert!(matches!(result, Err(VoiceError::ConnectTimeout)));
        assert!(!bridge.is_connected(guild()));
        assert!(node.calls().is_empty());
        assert_eq!(
            gateway.calls(),
            vec![GatewayCall::Join(guild(), channel()), GatewayCall::Leave(guild())]
        );
    }

    #[tokio::test]
    async fn test_connect_denied_is_reported() {
        let node = RecordingNode::new();
        let gateway = FakeGateway::new(JoinBehavior::Reject);
        let bridge = VoiceBridge::new(UserId::new(BOT), gateway, node);

        let result = bridge
            .connect(guild(), channel(), ConnectOptions::default(), Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(VoiceError::ConnectDenied(_))));
        assert!(!bridge.is_connected(guild()));
    }

    #[tokio::test]
    async fn test_node_rejecting_voice_discards_link() {
        let node = RecordingNode::new();
        node.set_available(false);
        let gateway = FakeGateway::new(JoinBehavior::Accept(voice_info("s1")));
        let bridge = VoiceBridge::new(UserId::new(BOT), gateway.clone(), node);

        let result = bridge
            .connect(guild(), channel(), ConnectOptions::default(), Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(VoiceError::Node(NodeError::Unavailable(_)))));
        assert!(!bridge.is_connected(guild()));
        assert_eq!(gateway.calls().last(), Some(&GatewayCall::Leave(guild())));
    }

    #[tokio::test]
    async fn test_other_users_state_is_ignored() {
        let (bridge, _node) = connected_bridge().await;

        assert_eq!(bridge.apply(state(1, None, "x")), BridgeOutput::Ignored);
        assert!(bridge.is_connected(guild()));
    }

    #[tokio::test]
    async fn test_updates_before_connect_are_not_forwarded() {
        let node = RecordingNode::new();
        let gateway = FakeGateway::new(JoinBehavior::Reject);
        let bridge = VoiceBridge::new(UserId::new(BOT), gateway, node);

        assert_eq!(bridge.apply(state(BOT, Some(channel()), "s1")), BridgeOutput::Ignored);
        assert_eq!(
            bridge.apply(server("token", "eu-west.discord.media:443")),
            BridgeOutput::Ignored
        );
    }

    #[tokio::test]
    async fn test_server_move_is_forwarded_once() {
        let (bridge, _node) = connected_bridge().await;

        // Duplicados de la negociación original no se reenvían
        assert_eq!(bridge.apply(state(BOT, Some(channel()), "s1")), BridgeOutput::Ignored);
        assert_eq!(
            bridge.apply(server("token", "eu-west.discord.media:443")),
            BridgeOutput::Ignored
        );

        let moved = VoiceServerInfo {
            endpoint: "us-east.discord.media:443".to_string(),
            ..voice_info("s1")
        };
        assert_eq!(
            bridge.apply(server("token", "us-east.discord.media:443")),
            BridgeOutput::Forward(guild(), moved.clone())
        );
        assert_eq!(
            bridge.apply(server("token", "us-east.discord.media:443")),
            BridgeOutput::Ignored
        );
        assert_eq!(bridge.link(guild()).unwrap().voice, moved);
    }

    #[tokio::test]
    async fn test_server_update_without_endpoint_waits() {
        let (bridge, _node) = connected_bridge().await;
        let event = GatewayEvent::ServerUpdate {
            guild_id: guild(),
            token: "new".to_string(),
            endpoint: None,
        };

        assert_eq!(bridge.apply(event), BridgeOutput::Ignored);
    }

    #[tokio::test]
    async fn test_bot_removed_closes_link() {
        let (bridge, _node) = connected_bridge().await;

        assert_eq!(bridge.apply(state(BOT, None, "s1")), BridgeOutput::LinkClosed(guild()));
        assert!(!bridge.is_connected(guild()));
        // Segunda vez ya no hay conexión
        assert_eq!(bridge.apply(state(BOT, None, "s1")), BridgeOutput::Ignored);
    }

    #[tokio::test]
    async fn test_channel_move_updates_link() {
        let (bridge, _node) = connected_bridge().await;
        let other = ChannelId::new(21);

        let output = bridge.apply(state(BOT, Some(other), "s2"));

        assert_eq!(output, BridgeOutput::Forward(guild(), voice_info("s2")));
        assert_eq!(bridge.link(guild()).unwrap().channel_id, other);
    }

    #[tokio::test]
    async fn test_forwarded_update_reaches_node_exactly_once() {
        let mut node = MockAudioNode::new();
        node.expect_voice_update()
            .withf(|guild_id, voice| {
                *guild_id == GuildId::new(10) && voice.endpoint == "eu-west.discord.media:443"
            })
            .times(1)
            .returning(|_, _| Ok(()));
        node.expect_voice_update()
            .withf(|_, voice| voice.endpoint == "us-east.discord.media:443")
            .times(1)
            .returning(|_, _| Ok(()));

        let gateway = FakeGateway::new(JoinBehavior::Accept(voice_info("s1")));
        let bridge = VoiceBridge::new(UserId::new(BOT), gateway, Arc::new(node));
        bridge
            .connect(guild(), channel(), ConnectOptions::default(), Duration::from_secs(1))
            .await
            .unwrap();

        bridge
            .on_voice_server_update(server("token", "eu-west.discord.media:443"))
            .await;
        bridge
            .on_voice_server_update(server("token", "us-east.discord.media:443"))
            .await;
        bridge
            .on_voice_server_update(server("token", "us-east.discord.media:443"))
            .await;
    }

    #[tokio::test]
    async fn test_forced_disconnect_ignores_gateway_errors() {
        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_leave()
            .times(2)
            .returning(|_| Err(GatewayError::NotConnected));
        let bridge = VoiceBridge::new(UserId::new(BOT), Arc::new(gateway), RecordingNode::new());

        assert!(bridge.disconnect(guild(), true).await.is_ok());
        assert!(matches!(
            bridge.disconnect(guild(), false).await,
            Err(VoiceError::Gateway(GatewayError::NotConnected))
        ));
    }
}
