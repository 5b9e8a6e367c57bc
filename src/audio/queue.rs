use std::collections::VecDeque;
use tracing::{debug, info};

use crate::sources::Track;

/// Cola FIFO de una sesión más la pista en curso.
///
/// Solo se modifica a través del [`Player`](super::player::Player) dueño, que
/// serializa todas las escrituras.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    current: Option<Track>,
    max_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull {
    pub max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            max_size,
        }
    }

    /// Agrega un track al final. Devuelve su posición (1 = siguiente).
    pub fn add_track(&mut self, track: Track) -> Result<usize, QueueFull> {
        if self.items.len() >= self.max_size {
            return Err(QueueFull {
                max_size: self.max_size,
            });
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        Ok(self.items.len())
    }

    /// Saca la cabeza de la cola y la convierte en la pista actual.
    pub fn next_track(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        match &next {
            Some(track) => info!("➡️ Siguiente en cola (FIFO): {}", track.title()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        self.current = next.clone();
        next
    }

    /// Devuelve `track` a la cabeza de la cola y deja la sesión sin pista actual.
    pub fn requeue_front(&mut self, track: Track) {
        self.items.push_front(track);
        self.current = None;
    }

    pub fn set_current(&mut self, track: Option<Track>) {
        self.current = track;
    }

    /// Limpia la cola. Devuelve cuántas pistas se descartaron.
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        info!("🗑️ Cola limpiada ({} pistas)", removed);
        removed
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::track;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fifo_order() {
        let mut queue = TrackQueue::new(10);
        queue.add_track(track("a")).unwrap();
        queue.add_track(track("b")).unwrap();

        assert_eq!(queue.next_track().unwrap().title(), "a");
        assert_eq!(queue.current().unwrap().title(), "a");
        assert_eq!(queue.next_track().unwrap().title(), "b");
        assert_eq!(queue.next_track(), None);
        assert_eq!(queue.current(), None);
    }

    #[test]
    fn test_positions_and_bound() {
        let mut queue = TrackQueue::new(2);
        assert_eq!(queue.add_track(track("a")), Ok(1));
        assert_eq!(queue.add_track(track("b")), Ok(2));
        assert_eq!(queue.add_track(track("c")), Err(QueueFull { max_size: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_requeue_front_restores_head() {
        let mut queue = TrackQueue::new(10);
        queue.add_track(track("a")).unwrap();
        queue.add_track(track("b")).unwrap();

        let head = queue.next_track().unwrap();
        queue.requeue_front(head);

        assert_eq!(queue.current(), None);
        let titles: Vec<_> = queue.tracks().iter().map(|t| t.title().to_string()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }
}
