use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::info;

use crate::audio::{node::AudioNode, player::Player};

/// Mapa guild -> [`Player`]. Fuente única de verdad de qué hace cada sesión.
///
/// `DashMap` bloquea por shard, así que guilds distintas no se esperan entre sí
/// y la entrada de una misma guild se crea una sola vez.
pub struct SessionRegistry {
    players: DashMap<GuildId, Arc<Player>>,
    node: Arc<dyn AudioNode>,
    max_queue_size: usize,
}

impl SessionRegistry {
    pub fn new(node: Arc<dyn AudioNode>, max_queue_size: usize) -> Self {
        Self {
            players: DashMap::new(),
            node,
            max_queue_size,
        }
    }

    /// Devuelve el player de la guild, creándolo si no existe.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<Player> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🆕 Player creado para guild {}", guild_id);
                Arc::new(Player::new(guild_id, self.node.clone(), self.max_queue_size))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.get(&guild_id).map(|p| p.clone())
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        let removed = self.players.remove(&guild_id).map(|(_, player)| player);
        if removed.is_some() {
            info!("🗑️ Player eliminado para guild {}", guild_id);
        }
        removed
    }

    pub fn players(&self) -> Vec<Arc<Player>> {
        self.players.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
