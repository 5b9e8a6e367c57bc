//! Dobles de prueba compartidos por los tests de cada módulo.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    audio::node::{AudioNode, NodeError, VoiceServerInfo},
    sources::{LoadedTrack, Track},
    voice::gateway::{ConnectOptions, GatewayError, VoiceGateway},
};

pub fn loaded(title: &str) -> LoadedTrack {
    LoadedTrack {
        encoded: format!("enc:{}", title),
        title: title.to_string(),
        author: None,
        source_url: format!("https://example.com/{}.mp3", title.replace(' ', "_")),
        duration: Some(Duration::from_secs(180)),
    }
}

/// Pista de 3 minutos pedida por el usuario 1.
pub fn track(title: &str) -> Track {
    loaded(title).requested_by(UserId::new(1))
}

/// Stream en vivo, sin duración.
pub fn stream(title: &str) -> Track {
    LoadedTrack {
        duration: None,
        ..loaded(title)
    }
    .requested_by(UserId::new(1))
}

pub fn voice_info(session: &str) -> VoiceServerInfo {
    VoiceServerInfo {
        session_id: session.to_string(),
        token: "token".to_string(),
        endpoint: "eu-west.discord.media:443".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeCall {
    Resolve(String),
    Play(GuildId, String),
    Pause(GuildId, bool),
    Stop(GuildId),
    Voice(GuildId, VoiceServerInfo),
    Destroy(GuildId),
}

/// Nodo falso que registra cada llamada y puede simular una caída.
pub struct RecordingNode {
    calls: Mutex<Vec<NodeCall>>,
    available: AtomicBool,
    delay: Option<Duration>,
    catalog: Mutex<HashMap<String, Vec<LoadedTrack>>>,
}

impl RecordingNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Cada comando tarda `delay`, útil para forzar carreras.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(Some(delay)))
    }

    fn build(delay: Option<Duration>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            delay,
            catalog: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Lo que devolverá `resolve_tracks` para `url`.
    pub fn add_result(&self, url: &str, tracks: Vec<LoadedTrack>) {
        self.catalog.lock().insert(url.to_string(), tracks);
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    async fn record(&self, call: NodeCall) -> Result<(), NodeError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(NodeError::Unavailable("nodo caído (test)".to_string()));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl AudioNode for RecordingNode {
    async fn resolve_tracks(&self, url: &str) -> Result<Vec<LoadedTrack>, NodeError> {
        self.record(NodeCall::Resolve(url.to_string())).await?;
        Ok(self.catalog.lock().get(url).cloned().unwrap_or_default())
    }

    async fn play(&self, guild_id: GuildId, track: &Track) -> Result<(), NodeError> {
        self.record(NodeCall::Play(guild_id, track.title().to_string()))
            .await
    }

    async fn pause(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError> {
        self.record(NodeCall::Pause(guild_id, paused)).await
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.record(NodeCall::Stop(guild_id)).await
    }

    async fn voice_update(&self, guild_id: GuildId, voice: &VoiceServerInfo) -> Result<(), NodeError> {
        self.record(NodeCall::Voice(guild_id, voice.clone())).await
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.record(NodeCall::Destroy(guild_id)).await
    }
}

/// Cómo responde [`FakeGateway::join`].
#[derive(Debug, Clone)]
pub enum JoinBehavior {
    Accept(VoiceServerInfo),
    Reject,
    /// Nunca responde; sirve para probar el timeout.
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Join(GuildId, ChannelId),
    Leave(GuildId),
}

pub struct FakeGateway {
    behavior: Mutex<JoinBehavior>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl FakeGateway {
    pub fn new(behavior: JoinBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_behavior(&self, behavior: JoinBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        _options: ConnectOptions,
    ) -> Result<VoiceServerInfo, GatewayError> {
        self.calls.lock().push(GatewayCall::Join(guild_id, channel_id));
        let behavior = self.behavior.lock().clone();
        match behavior {
            JoinBehavior::Accept(info) => Ok(info),
            JoinBehavior::Reject => Err(GatewayError::Rejected("sin permisos".to_string())),
            JoinBehavior::Hang => std::future::pending().await,
        }
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), GatewayError> {
        self.calls.lock().push(GatewayCall::Leave(guild_id));
        Ok(())
    }
}
