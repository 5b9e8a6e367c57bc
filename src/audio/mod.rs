//! # Audio Module
//!
//! Playback state for every guild, backed by a remote decoding node.
//!
//! ## Architecture
//!
//! ### [`node`] - Audio Node seam
//! - [`node::AudioNode`] trait: resolve, play, pause, stop, voice update, destroy
//! - Typed [`node::NodeEvent`] callbacks
//!
//! ### [`lavalink_client`] - Lavalink v4 client
//! - REST commands through `reqwest`
//! - Event socket with reconnect and session resume
//!
//! ### [`player`] - Player state machine
//! - `Idle -> Playing <-> Paused -> Idle`
//! - One async mutex per guild, held across the node call
//!
//! ### [`queue`] - Track queue
//! - Bounded FIFO plus the current track
//!
//! ### [`registry`] - Session registry
//! - `GuildId -> Player`, created on demand
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use drivecast::audio::{registry::SessionRegistry, player::Enqueued};
//! # async fn example(registry: &SessionRegistry, track: drivecast::sources::Track) -> anyhow::Result<()> {
//! let player = registry.get_or_create(serenity::all::GuildId::new(123456789));
//!
//! match player.enqueue(track).await? {
//!     Enqueued::Started(track) => println!("Reproduciendo {}", track.title()),
//!     Enqueued::Queued { position, .. } => println!("En cola, posición {}", position),
//! }
//! player.pause().await?;
//! player.resume().await?;
//! player.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod lavalink_client;
pub mod node;
pub mod player;
pub mod queue;
pub mod registry;
