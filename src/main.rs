use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
#[cfg(test)]
mod testing;
mod ui;
mod voice;

use crate::audio::lavalink_client::LavalinkNode;
use crate::bot::{
    dispatcher::{DispatchSettings, Dispatcher},
    events::spawn_event_router,
    DriveCastBot,
};
use crate::config::Config;
use crate::sources::MediaResolver;
use crate::voice::SongbirdGateway;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("drivecast=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando DriveCast v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("⚙️ {}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Identidad del bot, la necesita el nodo antes de abrir su socket
    let http = Http::new(&config.discord_token);
    let bot_user_id = http.get_current_user().await?.id;
    info!("🤖 Bot ID: {}", bot_user_id);

    let shutdown = CancellationToken::new();

    // Nodo de audio
    info!("🎼 Inicializando nodo de audio...");
    let (node, node_events) = LavalinkNode::new(&config.lavalink, bot_user_id);
    let node_task = node.clone().spawn(shutdown.clone());

    // Songbird solo negocia la voz; el audio lo manda el nodo
    let songbird = Songbird::serenity();
    let gateway = Arc::new(SongbirdGateway::new(songbird.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        bot_user_id,
        node,
        gateway,
        MediaResolver::new(config.drive_api_key.clone()),
        DispatchSettings::from_config(&config),
    ));
    let router_task = spawn_event_router(dispatcher.clone(), node_events, shutdown.clone());

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = DriveCastBot::new(config.clone(), dispatcher);
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        signal_shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    shutdown.cancel();
    let _ = node_task.await;
    let _ = router_task.await;
    info!("👋 DriveCast detenido");

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Solo verifica que el nodo de audio responda
    let (node, _) = LavalinkNode::new(&config.lavalink, serenity::model::id::UserId::new(1));
    match node.version().await {
        Ok(version) => {
            println!("OK (nodo {})", version.trim());
            Ok(())
        }
        Err(e) => anyhow::bail!("Nodo de audio no disponible: {}", e),
    }
}
