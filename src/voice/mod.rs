//! Voice transport: moves the bot between channels through the Discord
//! gateway and keeps the audio node in sync with the negotiated session.

pub mod bridge;
pub mod gateway;

pub use bridge::{BridgeOutput, GatewayEvent, VoiceBridge, VoiceError, VoiceLink};
pub use gateway::{ConnectOptions, SongbirdGateway, VoiceGateway};
