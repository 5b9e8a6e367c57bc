use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::player::{Enqueued, PlaybackState, PlayerSnapshot, SkipOutcome},
    bot::dispatcher::ControlOutcome,
    sources::Track,
    voice::VoiceLink,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 DriveCast";

/// Máximo de líneas de cola que caben cómodas en un embed
const QUEUE_PAGE: usize = 15;

fn base_embed() -> CreateEmbed {
    CreateEmbed::default()
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(description: &str) -> CreateEmbed {
    base_embed()
        .title("❌ Error")
        .description(description)
        .color(colors::ERROR_RED)
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    base_embed()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    base_embed()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
}

pub fn create_joined_embed(link: &VoiceLink) -> CreateEmbed {
    create_success_embed("Conectado", &format!("Entré a <#{}>", link.channel_id))
}

/// Respuesta de `/play`.
pub fn create_enqueued_embed(outcome: &Enqueued) -> CreateEmbed {
    match outcome {
        Enqueued::Started(track) => track_embed("▶️ Reproduciendo", track).color(colors::SUCCESS_GREEN),
        Enqueued::Queued { track, position } => track_embed("➕ Agregado a la cola", track)
            .field("📍 Posición", position.to_string(), true)
            .color(colors::MUSIC_PURPLE),
    }
}

/// Respuesta de `/np`.
pub fn create_now_playing_embed(snapshot: Option<&PlayerSnapshot>) -> CreateEmbed {
    let Some((snapshot, track)) = snapshot.and_then(|s| s.current.as_ref().map(|t| (s, t))) else {
        return create_info_embed("Nada sonando", "No hay ninguna canción reproduciéndose");
    };

    let title = match snapshot.state {
        PlaybackState::Paused => "⏸️ En pausa",
        _ => "🎶 Reproduciendo ahora",
    };
    let mut embed = track_embed(title, track).color(colors::SUCCESS_GREEN);
    if !snapshot.queue.is_empty() {
        embed = embed.field("📋 En cola", snapshot.queue.len().to_string(), true);
    }
    embed
}

/// Respuesta de `/queue`.
pub fn create_queue_embed(queue: &[Track]) -> CreateEmbed {
    if queue.is_empty() {
        return create_info_embed("Cola vacía", "No hay canciones en espera");
    }

    let mut description = queue_lines(queue, QUEUE_PAGE).join("\n");
    if queue.len() > QUEUE_PAGE {
        description.push_str(&format!("\n*... y {} más*", queue.len() - QUEUE_PAGE));
    }

    let total: Duration = queue.iter().filter_map(|t| t.duration()).sum();
    base_embed()
        .title("📋 Cola de reproducción")
        .description(description)
        .field("🎵 Canciones", queue.len().to_string(), true)
        .field("⏱️ Duración total", format_duration(total), true)
        .color(colors::INFO_BLUE)
}

/// Respuesta de `/control`.
pub fn create_control_embed(outcome: &ControlOutcome) -> CreateEmbed {
    match outcome {
        ControlOutcome::Paused(true) => create_success_embed("Pausado", "⏸️ Reproducción en pausa"),
        ControlOutcome::Paused(false) => create_info_embed("Sin cambios", "No hay nada sonando que pausar"),
        ControlOutcome::Resumed(true) => create_success_embed("Reanudado", "▶️ Reproducción reanudada"),
        ControlOutcome::Resumed(false) => create_info_embed("Sin cambios", "La reproducción no estaba en pausa"),
        ControlOutcome::Skipped(SkipOutcome::Next(track)) => {
            create_success_embed("Saltada", &format!("⏭️ Ahora suena **{}**", track.title()))
        }
        ControlOutcome::Skipped(SkipOutcome::QueueEnded) => {
            create_success_embed("Saltada", "⏭️ No quedan más canciones en la cola")
        }
        ControlOutcome::Skipped(SkipOutcome::NothingPlaying) => {
            create_info_embed("Sin cambios", "No hay nada sonando que saltar")
        }
        ControlOutcome::Stopped { cleared } => create_success_embed(
            "Detenido",
            &format!("⏹️ Reproducción detenida, {} canción(es) quitadas de la cola", cleared),
        ),
        ControlOutcome::Left => create_success_embed("Desconectado", "👋 ¡Hasta luego!")
            .color(colors::WARNING_ORANGE),
    }
}

fn track_embed(title: &str, track: &Track) -> CreateEmbed {
    let duration = track
        .duration()
        .map(format_duration)
        .unwrap_or_else(|| "🔴 En vivo".to_string());

    base_embed()
        .title(title)
        .description(format!("**{}**", track.title()))
        .url(track.source_url())
        .field("🎤 Artista", track.author().unwrap_or("Desconocido"), true)
        .field("⏱️ Duración", duration, true)
        .field("👤 Solicitado por", format!("<@{}>", track.requester()), true)
}

/// Una línea numerada por pista, empezando en 1.
pub fn queue_lines(queue: &[Track], limit: usize) -> Vec<String> {
    queue
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, track)| match track.duration() {
            Some(duration) => format!("{}. {} `{}`", i + 1, track.title(), format_duration(duration)),
            None => format!("{}. {} `en vivo`", i + 1, track.title()),
        })
        .collect()
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stream, track};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_queue_lines_are_numbered_and_limited() {
        let queue = vec![track("uno"), stream("radio"), track("tres")];
        assert_eq!(
            queue_lines(&queue, 2),
            vec!["1. uno `3:00`".to_string(), "2. radio `en vivo`".to_string()]
        );
    }

    #[test]
    fn test_now_playing_without_track_is_informative() {
        let idle = PlayerSnapshot {
            state: PlaybackState::Idle,
            current: None,
            queue: Vec::new(),
            acknowledged: false,
        };
        let value = serde_json::to_value(create_now_playing_embed(Some(&idle))).unwrap();
        assert_eq!(value["title"], "ℹ️ Nada sonando");

        let value = serde_json::to_value(create_now_playing_embed(None)).unwrap();
        assert_eq!(value["title"], "ℹ️ Nada sonando");
    }

    #[test]
    fn test_paused_track_is_labelled() {
        let paused = PlayerSnapshot {
            state: PlaybackState::Paused,
            current: Some(track("Song A")),
            queue: vec![track("Song B")],
            acknowledged: true,
        };
        let value = serde_json::to_value(create_now_playing_embed(Some(&paused))).unwrap();
        assert_eq!(value["title"], "⏸️ En pausa");
        assert_eq!(value["description"], "**Song A**");
    }

    #[test]
    fn test_queue_embed_mentions_overflow() {
        let queue: Vec<_> = (0..20).map(|i| track(&format!("t{}", i))).collect();
        let value = serde_json::to_value(create_queue_embed(&queue)).unwrap();
        assert!(value["description"].as_str().unwrap().contains("y 5 más"));
    }
}
