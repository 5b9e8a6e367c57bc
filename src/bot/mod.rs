//! # Bot Module
//!
//! Discord side of DriveCast.
//!
//! - [`dispatcher`]: command surface core (join, summon, play, np, queue, control)
//! - [`events`]: routes audio node callbacks to their guild, one lane per guild
//! - [`autojoin`]: shared eligibility rule for automatic joins
//! - [`commands`] / [`handlers`]: slash command registration and replies
//!
//! [`DriveCastBot`] implements Serenity's [`EventHandler`] and forwards voice
//! gateway events to the [`dispatcher::Dispatcher`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, Guild, GuildId, Interaction, Ready, VoiceServerUpdateEvent, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod autojoin;
pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod handlers;

use crate::{config::Config, voice::GatewayEvent};
use autojoin::candidates_from_guild;
use dispatcher::Dispatcher;

/// Handler de eventos de Discord.
pub struct DriveCastBot {
    config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
}

impl DriveCastBot {
    pub fn new(config: Arc<Config>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { config, dispatcher }
    }

    /// Registra comandos globales o por guild según `GUILD_ID`.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Intenta el auto-join en una guild con la regla compartida.
    async fn try_autojoin(&self, ctx: &Context, guild_id: GuildId) {
        let bot_id = ctx.cache.current_user().id;
        // La referencia de caché no puede cruzar un await
        let candidates = match ctx.cache.guild(guild_id) {
            Some(guild) => candidates_from_guild(&guild, bot_id),
            None => {
                debug!("Guild {} no está en caché, sin auto-join", guild_id);
                return;
            }
        };

        let preferred = self.config.autojoin_channel.as_deref();
        match self.dispatcher.autojoin(guild_id, &candidates, preferred).await {
            Ok(Some(link)) => info!("[AUTOJOIN] Guild {} / canal {}", guild_id, link.channel_id),
            Ok(None) => {}
            Err(e) => warn!("[AUTOJOIN] Falló en guild {}: {}", guild_id, e),
        }
    }
}

#[async_trait]
impl EventHandler for DriveCastBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Error al registrar comandos: {:?}", e);
        }
    }

    /// Auto-join de arranque, cuando la caché ya tiene todas las guilds.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        if !self.config.autojoin_on_join {
            return;
        }
        info!("🚀 Auto-join de arranque en {} guild(s)", guilds.len());
        for guild_id in guilds {
            self.try_autojoin(&ctx, guild_id).await;
        }
    }

    /// Auto-join al entrar a una guild nueva.
    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        if self.config.autojoin_on_join && is_new == Some(true) {
            info!("🆕 Nueva guild: {}", guild.name);
            self.try_autojoin(&ctx, guild.id).await;
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    async fn voice_state_update(&self, _ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else { return };
        let event = GatewayEvent::StateUpdate {
            guild_id,
            user_id: new.user_id,
            channel_id: new.channel_id,
            session_id: new.session_id,
        };
        self.dispatcher.handle_gateway_event(event).await;
    }

    async fn voice_server_update(&self, _ctx: Context, update: VoiceServerUpdateEvent) {
        let Some(guild_id) = update.guild_id else { return };
        let event = GatewayEvent::ServerUpdate {
            guild_id,
            token: update.token,
            endpoint: update.endpoint,
        };
        self.dispatcher.handle_gateway_event(event).await;
    }
}
