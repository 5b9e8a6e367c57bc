use serenity::model::{
    channel::ChannelType,
    guild::Guild,
    id::{ChannelId, UserId},
};
use tracing::debug;

/// Vista mínima de un canal de voz para decidir el auto-join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCandidate {
    pub id: ChannelId,
    pub name: String,
    /// Miembros conectados, bots incluidos.
    pub members: usize,
    pub humans: usize,
    /// El bot tiene permisos de conectar y hablar.
    pub joinable: bool,
}

/// Elige canal: el preferido por nombre si se puede entrar, si no el que más
/// miembros tenga. En empate gana el primero.
pub fn pick_voice_channel<'a>(
    candidates: &'a [ChannelCandidate],
    preferred: Option<&str>,
) -> Option<&'a ChannelCandidate> {
    if let Some(name) = preferred.filter(|n| !n.is_empty()) {
        if let Some(channel) = candidates.iter().find(|c| c.joinable && c.name == name) {
            return Some(channel);
        }
    }

    candidates
        .iter()
        .filter(|c| c.joinable)
        .fold(None, |best: Option<&ChannelCandidate>, channel| match best {
            Some(best) if best.members >= channel.members => Some(best),
            _ => Some(channel),
        })
}

/// Regla única de elegibilidad para los dos momentos de auto-join (arranque y
/// entrada a una guild nueva): solo se entra si hay al menos una persona.
pub fn autojoin_target(candidates: &[ChannelCandidate], preferred: Option<&str>) -> Option<ChannelId> {
    let channel = pick_voice_channel(candidates, preferred)?;
    if channel.humans == 0 {
        debug!("Canal {} sin personas, no se entra", channel.name);
        return None;
    }
    Some(channel.id)
}

/// Extrae los candidatos de una guild de la caché de serenity.
pub fn candidates_from_guild(guild: &Guild, bot_id: UserId) -> Vec<ChannelCandidate> {
    let bot_member = guild.members.get(&bot_id);

    let mut candidates: Vec<ChannelCandidate> = guild
        .channels
        .values()
        .filter(|channel| channel.kind == ChannelType::Voice)
        .map(|channel| {
            let states = guild
                .voice_states
                .values()
                .filter(|state| state.channel_id == Some(channel.id) && state.user_id != bot_id);

            let mut members = 0;
            let mut humans = 0;
            for state in states {
                members += 1;
                let is_bot = state
                    .member
                    .as_ref()
                    .map(|m| m.user.bot)
                    .or_else(|| guild.members.get(&state.user_id).map(|m| m.user.bot))
                    .unwrap_or(false);
                if !is_bot {
                    humans += 1;
                }
            }

            // Sin el miembro del bot en caché se intenta igual; el gateway dirá si no
            let joinable = bot_member
                .map(|member| {
                    let permissions = guild.user_permissions_in(channel, member);
                    permissions.connect() && permissions.speak()
                })
                .unwrap_or(true);

            ChannelCandidate {
                id: channel.id,
                name: channel.name.clone(),
                members,
                humans,
                joinable,
            }
        })
        .collect();

    candidates.sort_by_key(|c| c.id);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidate(id: u64, name: &str, members: usize, humans: usize, joinable: bool) -> ChannelCandidate {
        ChannelCandidate {
            id: ChannelId::new(id),
            name: name.to_string(),
            members,
            humans,
            joinable,
        }
    }

    #[test]
    fn test_preferred_channel_wins() {
        let channels = vec![candidate(1, "General", 5, 5, true), candidate(2, "Música", 1, 1, true)];
        let picked = pick_voice_channel(&channels, Some("Música")).unwrap();
        assert_eq!(picked.id, ChannelId::new(2));
    }

    #[test]
    fn test_preferred_but_not_joinable_falls_back_to_busiest() {
        let channels = vec![
            candidate(1, "General", 2, 2, true),
            candidate(2, "Música", 9, 9, false),
            candidate(3, "Juegos", 4, 3, true),
        ];
        let picked = pick_voice_channel(&channels, Some("Música")).unwrap();
        assert_eq!(picked.id, ChannelId::new(3));
    }

    #[test]
    fn test_tie_keeps_first_channel() {
        let channels = vec![candidate(1, "A", 2, 2, true), candidate(2, "B", 2, 2, true)];
        assert_eq!(pick_voice_channel(&channels, None).unwrap().id, ChannelId::new(1));
    }

    #[test]
    fn test_no_joinable_channel() {
        let channels = vec![candidate(1, "A", 3, 3, false)];
        assert!(pick_voice_channel(&channels, None).is_none());
        assert!(pick_voice_channel(&[], None).is_none());
    }

    #[test]
    fn test_autojoin_requires_a_human() {
        let only_bots = vec![candidate(1, "A", 2, 0, true)];
        assert_eq!(autojoin_target(&only_bots, None), None);

        let with_people = vec![candidate(1, "A", 2, 0, true), candidate(2, "B", 1, 1, true)];
        // El más poblado es A pero solo tiene bots
        assert_eq!(autojoin_target(&with_people, None), None);

        let busy = vec![candidate(1, "A", 3, 1, true)];
        assert_eq!(autojoin_target(&busy, None), Some(ChannelId::new(1)));
    }

    #[test]
    fn test_empty_preferred_channel_is_not_joined() {
        let channels = vec![candidate(1, "General", 4, 4, true), candidate(2, "Música", 0, 0, true)];
        assert_eq!(autojoin_target(&channels, Some("Música")), None);
        assert_eq!(autojoin_target(&channels, Some("")), Some(ChannelId::new(1)));
    }
}
