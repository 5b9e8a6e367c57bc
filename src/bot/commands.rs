use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, channel::ChannelType, id::GuildId},
    prelude::Context,
};

use crate::bot::dispatcher::Action;

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        summon_command(),
        play_command(),
        np_command(),
        queue_command(),
        control_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de voz

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Invita al bot a tu canal de voz")
}

fn summon_command() -> CreateCommand {
    CreateCommand::new("summon")
        .description("Lleva el bot directo a un canal de voz")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "channel", "Canal de voz destino")
                .channel_types(vec![ChannelType::Voice])
                .required(true),
        )
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce un archivo de Drive o una URL directa de audio")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "ID o enlace de Drive, o URL directa de audio",
            )
            .required(true),
        )
}

fn np_command() -> CreateCommand {
    CreateCommand::new("np").description("Muestra la canción actual")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn control_command() -> CreateCommand {
    let action = Action::ALL.into_iter().fold(
        CreateCommandOption::new(
            CommandOptionType::String,
            "action",
            "pause/resume/skip/stop/leave",
        )
        .required(true),
        |option, action| option.add_string_choice(action.as_str(), action.as_str()),
    );

    CreateCommand::new("control")
        .description("Controla la reproducción")
        .add_option(action)
}
