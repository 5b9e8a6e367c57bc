use thiserror::Error;

use crate::{
    audio::{node::NodeError, player::PlayerError},
    voice::VoiceError,
};

/// Fallos que un comando puede devolver al usuario. El `Display` es el texto
/// que se muestra en la respuesta.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Primero entra a un canal de voz")]
    NotInVoice,
    #[error("Pon un ID o enlace de Drive, o una URL directa de audio")]
    UnresolvableReference,
    #[error("No encontré ninguna pista. Revisa que el archivo sea público y el formato del enlace")]
    LookupEmpty,
    #[error("No se pudo cargar la pista: {0}")]
    LookupFailed(String),
    #[error("El canal de voz no respondió a tiempo")]
    ConnectTimeout,
    #[error("No pude entrar al canal de voz: {0}")]
    ConnectDenied(String),
    #[error("El nodo de audio no está disponible: {0}")]
    NodeUnavailable(String),
    #[error("Acción desconocida `{0}`. Usa pause, resume, skip, stop o leave")]
    InvalidAction(String),
    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),
}

impl From<NodeError> for DispatchError {
    fn from(error: NodeError) -> Self {
        match error {
            NodeError::LoadFailed(message) => DispatchError::LookupFailed(message),
            NodeError::Unavailable(message) => DispatchError::NodeUnavailable(message),
            rejected @ NodeError::Rejected { .. } => DispatchError::NodeUnavailable(rejected.to_string()),
        }
    }
}

impl From<PlayerError> for DispatchError {
    fn from(error: PlayerError) -> Self {
        match error {
            PlayerError::QueueFull { max_size } => DispatchError::QueueFull(max_size),
            PlayerError::Node(node) => node.into(),
        }
    }
}

impl From<VoiceError> for DispatchError {
    fn from(error: VoiceError) -> Self {
        match error {
            VoiceError::ConnectTimeout => DispatchError::ConnectTimeout,
            VoiceError::ConnectDenied(reason) => DispatchError::ConnectDenied(reason),
            VoiceError::Node(node) => node.into(),
            VoiceError::Gateway(gateway) => DispatchError::ConnectDenied(gateway.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::gateway::GatewayError;

    #[test]
    fn test_node_errors_map_to_user_failures() {
        assert_eq!(
            DispatchError::from(NodeError::Unavailable("caído".into())),
            DispatchError::NodeUnavailable("caído".into())
        );
        assert_eq!(
            DispatchError::from(NodeError::LoadFailed("403".into())),
            DispatchError::LookupFailed("403".into())
        );
        assert!(matches!(
            DispatchError::from(NodeError::Rejected { status: 400, message: "bad".into() }),
            DispatchError::NodeUnavailable(_)
        ));
    }

    #[test]
    fn test_player_and_voice_errors() {
        assert_eq!(
            DispatchError::from(PlayerError::QueueFull { max_size: 5 }),
            DispatchError::QueueFull(5)
        );
        assert_eq!(DispatchError::from(VoiceError::ConnectTimeout), DispatchError::ConnectTimeout);
        assert!(matches!(
            DispatchError::from(VoiceError::Gateway(GatewayError::NotConnected)),
            DispatchError::ConnectDenied(_)
        ));
    }

    #[test]
    fn test_invalid_action_mentions_input() {
        let text = DispatchError::InvalidAction("dance".into()).to_string();
        assert!(text.contains("dance"));
        assert!(text.contains("leave"));
    }
}
