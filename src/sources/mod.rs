//! # Sources Module
//!
//! Everything that turns user input into something the audio node can play:
//!
//! - [`drive`] - the media reference resolver (Drive file ids, share links, direct URLs)
//! - [`LoadedTrack`] / [`Track`] - tracks as returned by the node and as queued by a player

pub mod drive;

use serenity::model::id::UserId;
use std::time::Duration;

pub use drive::MediaResolver;

/// Pista tal como la devuelve el nodo, todavía sin solicitante.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTrack {
    /// Handle opaco del nodo para reproducir la pista.
    pub encoded: String,
    pub title: String,
    pub author: Option<String>,
    pub source_url: String,
    pub duration: Option<Duration>,
}

impl LoadedTrack {
    /// Fija el solicitante y congela la pista.
    pub fn requested_by(self, requester: UserId) -> Track {
        Track {
            encoded: self.encoded,
            title: self.title,
            author: self.author,
            source_url: self.source_url,
            duration: self.duration,
            requester,
        }
    }
}

/// Pista resuelta y lista para la cola. Inmutable una vez creada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    encoded: String,
    title: String,
    author: Option<String>,
    source_url: String,
    duration: Option<Duration>,
    requester: UserId,
}

impl Track {
    // Getters
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
    pub fn source_url(&self) -> &str {
        &self.source_url
    }
    /// `None` para streams en vivo.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn requester(&self) -> UserId {
        self.requester
    }
}
