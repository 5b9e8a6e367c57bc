use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use serenity::model::id::{GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::node::{AudioNode, NodeError, NodeEvent, TrackEndReason, VoiceServerInfo},
    config::NodeConfig,
    sources::{LoadedTrack, Track},
};

const CLIENT_NAME: &str = concat!("drivecast/", env!("CARGO_PKG_VERSION"));
const RESUME_TIMEOUT_SECS: u64 = 60;
const MAX_BACKOFF: Duration = Duration::from_secs(30);
// Solo acota abrir la conexión: un comando aceptado por el nodo no se corta
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cliente de un nodo Lavalink v4.
///
/// Los comandos van por REST y necesitan la sesión que entrega el socket de
/// eventos; sin ella fallan con [`NodeError::Unavailable`]. Los callbacks del
/// nodo salen por el canal devuelto en [`LavalinkNode::new`].
pub struct LavalinkNode {
    http: reqwest::Client,
    rest_base: String,
    websocket_url: String,
    password: String,
    user_id: UserId,
    session_id: RwLock<Option<String>>,
    // Última sesión vista, se ofrece al reconectar para reanudarla
    resume_id: RwLock<Option<String>>,
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl LavalinkNode {
    pub fn new(config: &NodeConfig, user_id: UserId) -> (Arc<Self>, mpsc::UnboundedReceiver<NodeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();

        let node = Arc::new(Self {
            http,
            rest_base: config.rest_base(),
            websocket_url: config.websocket_url(),
            password: config.password.clone(),
            user_id,
            session_id: RwLock::new(None),
            resume_id: RwLock::new(None),
            events: tx,
        });
        (node, rx)
    }

    /// Versión del nodo (`GET /version`), usada por el health check.
    pub async fn version(&self) -> Result<String, NodeError> {
        let base = self.rest_base.trim_end_matches("/v4");
        let request = self.http.get(format!("{}/version", base));
        Ok(self.send(request).await?.text().await?)
    }

    /// Lanza el bucle del socket de eventos. Se reconecta solo hasta que
    /// `shutdown` se cancela.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut attempt: u32 = 0;

        loop {
            info!("🎼 Conectando al nodo de audio en {}", self.websocket_url);
            match self.connect_once(&shutdown).await {
                Ok(true) => attempt = 0,
                Ok(false) => {}
                Err(e) => warn!("⚠️ Socket del nodo de audio: {:#}", e),
            }

            if self.session_id.write().take().is_some() {
                self.emit(NodeEvent::Disconnected);
            }

            if shutdown.is_cancelled() {
                break;
            }

            let delay = backoff(attempt);
            attempt = attempt.saturating_add(1);
            warn!("🔄 Reintentando conexión al nodo en {:?}", delay);

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("👋 Socket del nodo de audio cerrado");
    }

    /// Una conexión completa del socket. Devuelve si llegó a recibir `ready`.
    async fn connect_once(&self, shutdown: &CancellationToken) -> Result<bool> {
        let mut request = self
            .websocket_url
            .as_str()
            .into_client_request()
            .context("URL de websocket inválida")?;

        let headers = request.headers_mut();
        headers.insert("Authorization", HeaderValue::from_str(&self.password)?);
        headers.insert("User-Id", HeaderValue::from_str(&self.user_id.get().to_string())?);
        headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));
        if let Some(previous) = self.resume_id.read().clone() {
            headers.insert("Session-Id", HeaderValue::from_str(&previous)?);
        }

        let (mut socket, _) = connect_async(request)
            .await
            .context("No se pudo abrir el socket del nodo")?;

        let mut ready = false;
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = socket.close(None).await;
                    return Ok(ready);
                }
                message = socket.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => {
                    if self.handle_text(&text).await {
                        ready = true;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!("🔌 El nodo cerró el socket: {:?}", frame);
                    return Ok(ready);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("Error leyendo el socket del nodo"),
                None => return Ok(ready),
            }
        }
    }

    /// Procesa un mensaje de texto. Devuelve `true` si era `ready`.
    async fn handle_text(&self, text: &str) -> bool {
        let message = match serde_json::from_str::<IncomingMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Mensaje del nodo no reconocido: {} ({})", e, text);
                return false;
            }
        };

        match message {
            IncomingMessage::Ready { resumed, session_id } => {
                info!("✅ Nodo listo (sesión {}, reanudada: {})", session_id, resumed);
                *self.session_id.write() = Some(session_id.clone());
                *self.resume_id.write() = Some(session_id.clone());
                if let Err(e) = self.enable_resuming(&session_id).await {
                    warn!("No se pudo activar la reanudación de sesión: {}", e);
                }
                self.emit(NodeEvent::Ready { resumed });
                true
            }
            IncomingMessage::PlayerUpdate { guild_id, state } => {
                debug!(
                    "Player {} en {} ms (conectado: {})",
                    guild_id, state.position, state.connected
                );
                false
            }
            IncomingMessage::Stats { players, playing_players } => {
                debug!("📊 Nodo: {} players, {} reproduciendo", players, playing_players);
                false
            }
            IncomingMessage::Event(payload) => {
                if let Some(event) = payload.into_node_event() {
                    self.emit(event);
                }
                false
            }
            IncomingMessage::Unknown => false,
        }
    }

    fn emit(&self, event: NodeEvent) {
        if self.events.send(event).is_err() {
            debug!("Nadie escucha los eventos del nodo");
        }
    }

    fn session(&self) -> Result<String, NodeError> {
        self.session_id
            .read()
            .clone()
            .ok_or_else(|| NodeError::Unavailable("sin sesión con el nodo".to_string()))
    }

    fn player_url(&self, session_id: &str, guild_id: GuildId) -> String {
        format!("{}/sessions/{}/players/{}", self.rest_base, session_id, guild_id)
    }

    async fn enable_resuming(&self, session_id: &str) -> Result<(), NodeError> {
        let request = self
            .http
            .patch(format!("{}/sessions/{}", self.rest_base, session_id))
            .json(&json!({ "resuming": true, "timeout": RESUME_TIMEOUT_SECS }));
        self.send(request).await.map(|_| ())
    }

    async fn update_player(&self, guild_id: GuildId, body: Value) -> Result<(), NodeError> {
        let session_id = self.session()?;
        let request = self.http.patch(self.player_url(&session_id, guild_id)).json(&body);
        self.send(request).await.map(|_| ())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, NodeError> {
        let response = request
            .header("Authorization", &self.password)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<RestError>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        Err(NodeError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AudioNode for LavalinkNode {
    async fn resolve_tracks(&self, url: &str) -> Result<Vec<LoadedTrack>, NodeError> {
        let request = self
            .http
            .get(format!("{}/loadtracks", self.rest_base))
            .query(&[("identifier", url)]);
        let result: LoadResult = self.send(request).await?.json().await?;
        let tracks = result.into_tracks(url)?;
        debug!("🔍 {} pista(s) cargadas desde {}", tracks.len(), url);
        Ok(tracks)
    }

    async fn play(&self, guild_id: GuildId, track: &Track) -> Result<(), NodeError> {
        self.update_player(
            guild_id,
            json!({ "track": { "encoded": track.encoded() }, "paused": false }),
        )
        .await
    }

    async fn pause(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError> {
        self.update_player(guild_id, json!({ "paused": paused })).await
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.update_player(guild_id, json!({ "track": { "encoded": null } }))
            .await
    }

    async fn voice_update(&self, guild_id: GuildId, voice: &VoiceServerInfo) -> Result<(), NodeError> {
        self.update_player(
            guild_id,
            json!({
                "voice": {
                    "token": voice.token,
                    "endpoint": voice.endpoint,
                    "sessionId": voice.session_id,
                }
            }),
        )
        .await
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<(), NodeError> {
        let session_id = self.session()?;
        let request = self.http.delete(self.player_url(&session_id, guild_id));
        self.send(request).await.map(|_| ())
    }
}

/// 1s, 2s, 4s... hasta 30s.
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(5)).min(MAX_BACKOFF)
}

fn parse_guild(raw: &str) -> Option<GuildId> {
    raw.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum IncomingMessage {
    Ready {
        resumed: bool,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    PlayerUpdate {
        #[serde(rename = "guildId")]
        guild_id: String,
        state: PlayerState,
    },
    Stats {
        players: u32,
        #[serde(rename = "playingPlayers")]
        playing_players: u32,
    },
    Event(EventPayload),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct PlayerState {
    #[serde(default)]
    position: u64,
    #[serde(default)]
    connected: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum EventPayload {
    TrackStartEvent {
        #[serde(rename = "guildId")]
        guild_id: String,
        track: WireTrack,
    },
    TrackEndEvent {
        #[serde(rename = "guildId")]
        guild_id: String,
        track: WireTrack,
        reason: TrackEndReason,
    },
    TrackExceptionEvent {
        #[serde(rename = "guildId")]
        guild_id: String,
        track: WireTrack,
        exception: WireException,
    },
    TrackStuckEvent {
        #[serde(rename = "guildId")]
        guild_id: String,
        track: WireTrack,
        #[serde(rename = "thresholdMs")]
        threshold_ms: u64,
    },
    WebSocketClosedEvent {
        #[serde(rename = "guildId")]
        guild_id: String,
        code: u16,
        reason: String,
        #[serde(rename = "byRemote")]
        by_remote: bool,
    },
    #[serde(other)]
    Unknown,
}

impl EventPayload {
    fn into_node_event(self) -> Option<NodeEvent> {
        let event = match self {
            EventPayload::TrackStartEvent { guild_id, track } => NodeEvent::TrackStart {
                guild_id: parse_guild(&guild_id)?,
                encoded: track.encoded,
            },
            EventPayload::TrackEndEvent { guild_id, track, reason } => NodeEvent::TrackEnd {
                guild_id: parse_guild(&guild_id)?,
                encoded: track.encoded,
                reason,
            },
            EventPayload::TrackExceptionEvent { guild_id, track, exception } => {
                NodeEvent::TrackException {
                    guild_id: parse_guild(&guild_id)?,
                    encoded: track.encoded,
                    message: exception.message.unwrap_or(exception.cause),
                }
            }
            EventPayload::TrackStuckEvent { guild_id, track, threshold_ms } => NodeEvent::TrackStuck {
                guild_id: parse_guild(&guild_id)?,
                encoded: track.encoded,
                threshold: Duration::from_millis(threshold_ms),
            },
            EventPayload::WebSocketClosedEvent { guild_id, code, reason, by_remote } => {
                NodeEvent::VoiceClosed {
                    guild_id: parse_guild(&guild_id)?,
                    code,
                    reason,
                    by_remote,
                }
            }
            EventPayload::Unknown => return None,
        };
        Some(event)
    }
}

#[derive(Debug, Deserialize)]
struct WireTrack {
    encoded: String,
    info: WireTrackInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTrackInfo {
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    length: u64,
    #[serde(default)]
    is_stream: bool,
    uri: Option<String>,
}

impl WireTrack {
    fn into_loaded(self, requested_url: &str) -> LoadedTrack {
        let info = self.info;
        LoadedTrack {
            encoded: self.encoded,
            title: info.title,
            author: Some(info.author).filter(|a| !a.is_empty() && a != "Unknown artist"),
            source_url: info.uri.unwrap_or_else(|| requested_url.to_string()),
            duration: (!info.is_stream).then(|| Duration::from_millis(info.length)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireException {
    message: Option<String>,
    #[serde(default)]
    cause: String,
}

#[derive(Debug, Deserialize)]
struct RestError {
    message: String,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
enum LoadType {
    Track,
    Playlist,
    Search,
    Empty,
    Error,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadResult {
    load_type: LoadType,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct PlaylistData {
    tracks: Vec<WireTrack>,
}

impl LoadResult {
    fn into_tracks(self, requested_url: &str) -> Result<Vec<LoadedTrack>, NodeError> {
        let malformed = |e: serde_json::Error| NodeError::LoadFailed(format!("respuesta inválida: {}", e));

        let wire = match self.load_type {
            LoadType::Track => vec![serde_json::from_value::<WireTrack>(self.data).map_err(malformed)?],
            LoadType::Playlist => serde_json::from_value::<PlaylistData>(self.data)
                .map_err(malformed)?
                .tracks,
            LoadType::Search => serde_json::from_value::<Vec<WireTrack>>(self.data).map_err(malformed)?,
            LoadType::Empty => Vec::new(),
            LoadType::Error => {
                let exception: WireException = serde_json::from_value(self.data).map_err(malformed)?;
                error!("❌ El nodo no pudo cargar {}: {:?}", requested_url, exception.message);
                return Err(NodeError::LoadFailed(
                    exception.message.unwrap_or(exception.cause),
                ));
            }
        };

        Ok(wire
            .into_iter()
            .map(|track| track.into_loaded(requested_url))
            .collect())
    }
}
