use serenity::model::id::GuildId;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        node::{AudioNode, NodeError, TrackEndReason},
        queue::{QueueFull, TrackQueue},
    },
    sources::Track,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("la cola está llena (máximo {max_size} canciones)")]
    QueueFull { max_size: usize },
    #[error(transparent)]
    Node(#[from] NodeError),
}

impl From<QueueFull> for PlayerError {
    fn from(full: QueueFull) -> Self {
        PlayerError::QueueFull {
            max_size: full.max_size,
        }
    }
}

/// Resultado de [`Player::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Enqueued {
    /// El player estaba ocioso y la pista empezó a sonar.
    Started(Track),
    /// Quedó en cola; `position` 1 es la siguiente.
    Queued { track: Track, position: usize },
}

impl Enqueued {
    pub fn track(&self) -> &Track {
        match self {
            Enqueued::Started(track) | Enqueued::Queued { track, .. } => track,
        }
    }
}

/// Resultado de [`Player::skip`].
#[derive(Debug, Clone, PartialEq)]
pub enum SkipOutcome {
    NothingPlaying,
    Next(Track),
    /// No quedaba nada en cola: el player quedó ocioso.
    QueueEnded,
}

/// Estado consistente de un player en un instante.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub state: PlaybackState,
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    /// El nodo confirmó que la pista actual empezó a sonar.
    pub acknowledged: bool,
}

struct PlayerInner {
    queue: TrackQueue,
    state: PlaybackState,
    acknowledged: bool,
}

impl PlayerInner {
    fn go_idle(&mut self) {
        self.queue.set_current(None);
        self.state = PlaybackState::Idle;
        self.acknowledged = false;
    }
}

/// Máquina de estados de reproducción de una sesión (guild).
///
/// Todas las operaciones que mutan toman el mismo lock asíncrono y lo mantienen
/// durante la llamada al nodo, así cola y pista actual cambian de forma atómica y
/// en el orden en que llegaron los comandos. El estado solo se confirma cuando el
/// nodo acepta la orden; si el nodo no responde, `queue` y `current` quedan como
/// estaban.
pub struct Player {
    guild_id: GuildId,
    node: Arc<dyn AudioNode>,
    inner: Mutex<PlayerInner>,
}

impl Player {
    pub fn new(guild_id: GuildId, node: Arc<dyn AudioNode>, max_queue_size: usize) -> Self {
        Self {
            guild_id,
            node,
            inner: Mutex::new(PlayerInner {
                queue: TrackQueue::new(max_queue_size),
                state: PlaybackState::Idle,
                acknowledged: false,
            }),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Agrega a la cola; si el player está ocioso, empieza a reproducir.
    ///
    /// Si el nodo falla al arrancar, la pista queda en la cola.
    pub async fn enqueue(&self, track: Track) -> Result<Enqueued, PlayerError> {
        let mut inner = self.inner.lock().await;
        let was_empty = inner.queue.is_empty();
        let position = inner.queue.add_track(track.clone())?;

        if inner.state != PlaybackState::Idle {
            return Ok(Enqueued::Queued { track, position });
        }

        // Tras una caída del nodo puede haber pistas anteriores esperando
        match self.start_next(&mut inner).await? {
            Some(started) if was_empty => Ok(Enqueued::Started(started)),
            _ => Ok(Enqueued::Queued {
                track,
                position: position.saturating_sub(1).max(1),
            }),
        }
    }

    /// Callback del nodo: la pista `encoded` terminó.
    ///
    /// Devuelve la nueva pista actual si se avanzó.
    pub async fn on_track_end(
        &self,
        encoded: &str,
        reason: TrackEndReason,
    ) -> Result<Option<Track>, PlayerError> {
        if !reason.may_start_next() {
            debug!(
                "Fin de pista ignorado en guild {} (motivo {:?})",
                self.guild_id, reason
            );
            return Ok(None);
        }

        self.advance_after(encoded).await
    }

    /// Callback del nodo: la pista quedó trabada, se trata como un final.
    pub async fn on_track_stuck(&self, encoded: &str) -> Result<Option<Track>, PlayerError> {
        warn!("⚠️ Pista trabada en guild {}, avanzando", self.guild_id);
        self.advance_after(encoded).await
    }

    /// Callback del nodo: la pista `encoded` empezó a sonar.
    pub async fn on_track_start(&self, encoded: &str) {
        let mut inner = self.inner.lock().await;
        if inner.queue.current().map(|t| t.encoded()) == Some(encoded) {
            inner.acknowledged = true;
        }
    }

    /// Pausa. Solo tiene efecto desde `Playing`.
    pub async fn pause(&self) -> Result<bool, PlayerError> {
        self.set_paused(true).await
    }

    /// Reanuda. Solo tiene efecto desde `Paused`.
    pub async fn resume(&self) -> Result<bool, PlayerError> {
        self.set_paused(false).await
    }

    /// Salta la pista actual como si hubiera terminado.
    pub async fn skip(&self) -> Result<SkipOutcome, PlayerError> {
        let mut inner = self.inner.lock().await;
        if inner.state == PlaybackState::Idle {
            return Ok(SkipOutcome::NothingPlaying);
        }

        if inner.queue.is_empty() {
            self.node.stop(self.guild_id).await?;
            inner.go_idle();
            info!("⏭️ Skip sin siguiente pista en guild {}", self.guild_id);
            return Ok(SkipOutcome::QueueEnded);
        }

        info!("⏭️ Skip en guild {}", self.guild_id);
        match self.start_next(&mut inner).await? {
            Some(next) => Ok(SkipOutcome::Next(next)),
            None => Ok(SkipOutcome::QueueEnded),
        }
    }

    /// Vacía la cola y detiene la reproducción.
    ///
    /// El estado local siempre queda limpio, aunque el nodo no confirme la parada.
    /// Devuelve cuántas pistas pendientes se descartaron.
    pub async fn stop(&self) -> Result<usize, PlayerError> {
        let mut inner = self.inner.lock().await;
        let was_active = inner.state != PlaybackState::Idle;
        let cleared = inner.queue.clear();
        inner.go_idle();

        if was_active {
            self.node.stop(self.guild_id).await?;
        }

        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        Ok(cleared)
    }

    /// Retoma la reproducción tras una sesión nueva del nodo.
    pub async fn recover(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock().await;

        match (inner.state, inner.queue.current().cloned()) {
            (PlaybackState::Idle, _) => {
                if !inner.queue.is_empty() {
                    self.start_next(&mut inner).await?;
                }
            }
            (state, Some(current)) => {
                info!("🔄 Reenviando pista actual en guild {}", self.guild_id);
                inner.acknowledged = false;
                self.node.play(self.guild_id, &current).await?;
                if state == PlaybackState::Paused {
                    self.node.pause(self.guild_id, true).await?;
                }
            }
            (_, None) => inner.go_idle(),
        }

        Ok(())
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let inner = self.inner.lock().await;
        PlayerSnapshot {
            state: inner.state,
            current: inner.queue.current().cloned(),
            queue: inner.queue.tracks(),
            acknowledged: inner.acknowledged,
        }
    }

    pub async fn state(&self) -> PlaybackState {
        self.inner.lock().await.state
    }

    pub async fn now_playing(&self) -> Option<Track> {
        self.inner.lock().await.queue.current().cloned()
    }

    async fn set_paused(&self, paused: bool) -> Result<bool, PlayerError> {
        let mut inner = self.inner.lock().await;
        let (from, to) = if paused {
            (PlaybackState::Playing, PlaybackState::Paused)
        } else {
            (PlaybackState::Paused, PlaybackState::Playing)
        };

        if inner.state != from {
            debug!(
                "Pausa={} ignorada en guild {}: estado {:?}",
                paused, self.guild_id, inner.state
            );
            return Ok(false);
        }

        self.node.pause(self.guild_id, paused).await?;
        inner.state = to;
        Ok(true)
    }

    async fn advance_after(&self, encoded: &str) -> Result<Option<Track>, PlayerError> {
        let mut inner = self.inner.lock().await;

        if inner.queue.current().map(|t| t.encoded()) != Some(encoded) {
            debug!(
                "Evento de pista obsoleto en guild {}, la actual ya cambió",
                self.guild_id
            );
            return Ok(None);
        }

        if inner.queue.is_empty() {
            inner.go_idle();
            info!("📭 Cola terminada en guild {}", self.guild_id);
            return Ok(None);
        }

        match self.start_next(&mut inner).await {
            Ok(next) => Ok(next),
            Err(e) => {
                // La pista anterior ya terminó en el nodo: no hay nada sonando.
                inner.go_idle();
                Err(e)
            }
        }
    }

    /// Pasa la cabeza de la cola a `current` y la envía al nodo.
    ///
    /// Si el nodo la rechaza, la cabeza vuelve a la cola y `current` se restaura.
    async fn start_next(&self, inner: &mut PlayerInner) -> Result<Option<Track>, PlayerError> {
        let previous = inner.queue.current().cloned();
        let Some(next) = inner.queue.next_track() else {
            return Ok(None);
        };

        if let Err(e) = self.node.play(self.guild_id, &next).await {
            warn!(
                "❌ El nodo rechazó '{}' en guild {}: {}",
                next.title(),
                self.guild_id,
                e
            );
            inner.queue.requeue_front(next);
            inner.queue.set_current(previous);
            return Err(e.into());
        }

        info!("🎵 Reproduciendo: {} en guild {}", next.title(), self.guild_id);
        inner.state = PlaybackState::Playing;
        inner.acknowledged = false;
        Ok(Some(next))
    }
}
