use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{bot::DriveCastBot, error::DispatchError, ui::embeds};

/// Maneja comandos slash. Todas las ramas responden, con éxito o con error.
///
/// Los comandos conocidos se difieren antes de tocar la sesión: pueden
/// esperar turno detrás de un `/play` lento y Discord solo da 3 segundos para
/// la primera respuesta.
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &DriveCastBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(
            ctx,
            &command,
            embeds::create_error_embed("Este comando solo funciona dentro de un servidor"),
            true,
        )
        .await;
    };

    let Some(ephemeral) = ephemeral_reply(&command.data.name) else {
        warn!("Comando desconocido: {}", command.data.name);
        return respond(
            ctx,
            &command,
            embeds::create_error_embed("Comando no reconocido"),
            true,
        )
        .await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    defer(ctx, &command, ephemeral).await?;

    let embed = match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "summon" => handle_summon(&command, bot, guild_id).await,
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "np" => handle_now_playing(bot, guild_id).await,
        "queue" => handle_queue(bot, guild_id).await,
        _ => handle_control(&command, bot, guild_id).await,
    };
    edit(ctx, &command, embed).await
}

/// Si la respuesta diferida de cada comando es efímera; `None` si no existe.
fn ephemeral_reply(name: &str) -> Option<bool> {
    match name {
        "join" | "summon" => Some(true),
        "play" | "np" | "queue" | "control" => Some(false),
        _ => None,
    }
}

// Handlers específicos para cada comando

async fn handle_join(ctx: &Context, command: &CommandInteraction, bot: &DriveCastBot, guild_id: GuildId) -> CreateEmbed {
    let user_channel = user_voice_channel(ctx, guild_id, command.user.id);
    let result = bot.dispatcher.join(guild_id, user_channel).await;
    outcome_embed(result, embeds::create_joined_embed)
}

async fn handle_summon(command: &CommandInteraction, bot: &DriveCastBot, guild_id: GuildId) -> CreateEmbed {
    let Some(channel_id) = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "channel")
        .and_then(|opt| opt.value.as_channel_id())
    else {
        return embeds::create_error_embed("Indica un canal de voz");
    };

    let result = bot.dispatcher.summon(guild_id, channel_id).await;
    outcome_embed(result, embeds::create_joined_embed)
}

async fn handle_play(ctx: &Context, command: &CommandInteraction, bot: &DriveCastBot, guild_id: GuildId) -> CreateEmbed {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default()
        .to_string();

    let user_channel = user_voice_channel(ctx, guild_id, command.user.id);
    let result = bot
        .dispatcher
        .play(guild_id, &query, command.user.id, user_channel)
        .await;
    outcome_embed(result, embeds::create_enqueued_embed)
}

async fn handle_now_playing(bot: &DriveCastBot, guild_id: GuildId) -> CreateEmbed {
    let snapshot = bot.dispatcher.snapshot(guild_id).await;
    embeds::create_now_playing_embed(snapshot.as_ref())
}

async fn handle_queue(bot: &DriveCastBot, guild_id: GuildId) -> CreateEmbed {
    let queue = bot.dispatcher.list_queue(guild_id).await;
    embeds::create_queue_embed(&queue)
}

async fn handle_control(command: &CommandInteraction, bot: &DriveCastBot, guild_id: GuildId) -> CreateEmbed {
    let action = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "action")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default()
        .to_string();

    let result = bot.dispatcher.control_str(guild_id, &action).await;
    outcome_embed(result, embeds::create_control_embed)
}

// Funciones auxiliares

fn outcome_embed<T>(result: Result<T, DispatchError>, on_success: impl FnOnce(&T) -> CreateEmbed) -> CreateEmbed {
    match result {
        Ok(value) => on_success(&value),
        Err(e) => {
            warn!("⚠️ Comando fallido: {}", e);
            embeds::create_error_embed(&e.to_string())
        }
    }
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn defer(ctx: &Context, command: &CommandInteraction, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(ephemeral)),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

/// Canal de voz donde está el usuario, según la caché.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);
    channel_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::commands::all_commands;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_registered_command_is_deferred() {
        for command in all_commands() {
            let value = serde_json::to_value(command).unwrap();
            let name = value["name"].as_str().unwrap();
            assert!(ephemeral_reply(name).is_some(), "/{} no se difiere", name);
        }
    }

    #[test]
    fn test_voice_replies_are_ephemeral() {
        assert_eq!(ephemeral_reply("join"), Some(true));
        assert_eq!(ephemeral_reply("summon"), Some(true));
        assert_eq!(ephemeral_reply("control"), Some(false));
        assert_eq!(ephemeral_reply("bailar"), None);
    }
}
