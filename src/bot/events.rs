use serenity::model::id::GuildId;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{audio::node::NodeEvent, bot::dispatcher::Dispatcher};

/// Cada cuánto se cierran los carriles sin eventos pendientes.
const LANE_SWEEP: Duration = Duration::from_secs(60);

/// Reparte los eventos del nodo en un carril (tarea) por guild.
///
/// Dentro de una guild los eventos se aplican en el orden en que el nodo los
/// emitió; una guild lenta no frena a las demás. Los eventos sin guild
/// (`Ready`, `Disconnected`) se aplican en línea, antes de seguir repartiendo.
pub fn spawn_event_router(
    dispatcher: Arc<Dispatcher>,
    events: mpsc::UnboundedReceiver<NodeEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(route_events(dispatcher, events, shutdown, LANE_SWEEP))
}

async fn route_events(
    dispatcher: Arc<Dispatcher>,
    mut events: mpsc::UnboundedReceiver<NodeEvent>,
    shutdown: CancellationToken,
    sweep_every: Duration,
) {
    let mut lanes: HashMap<GuildId, Lane> = HashMap::new();
    let mut sweep = tokio::time::interval(sweep_every);

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sweep.tick() => {
                // Solo el router envía, así que un carril ocioso no puede recibir nada a medias
                lanes.retain(|_, lane| !lane.is_idle());
                continue;
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let Some(guild_id) = event.guild_id() else {
            dispatcher.handle_node_event(event).await;
            continue;
        };

        let lane = lanes
            .entry(guild_id)
            .or_insert_with(|| Lane::spawn(guild_id, dispatcher.clone()));

        if let Err(event) = lane.send(event) {
            // El carril terminó; se abre uno nuevo con el mismo evento
            debug!("Carril de guild {} cerrado, reabriendo", guild_id);
            let fresh = Lane::spawn(guild_id, dispatcher.clone());
            let _ = fresh.send(event);
            lanes.insert(guild_id, fresh);
        }
    }

    // Cerrar los carriles y esperar a que vacíen lo pendiente
    let handles: Vec<_> = lanes.into_values().map(|lane| lane.handle).collect();
    for handle in handles {
        let _ = handle.await;
    }
    info!("👋 Router de eventos del nodo detenido");
}

struct Lane {
    sender: mpsc::UnboundedSender<NodeEvent>,
    // Eventos enviados que el carril todavía no terminó de aplicar
    in_flight: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl Lane {
    fn spawn(guild_id: GuildId, dispatcher: Arc<Dispatcher>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<NodeEvent>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let counter = in_flight.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                dispatcher.handle_node_event(event).await;
                counter.fetch_sub(1, Ordering::AcqRel);
            }
            debug!("Carril de eventos de guild {} cerrado", guild_id);
        });
        Self {
            sender,
            in_flight,
            handle,
        }
    }

    fn send(&self, event: NodeEvent) -> Result<(), NodeEvent> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.sender.send(event).map_err(|mpsc::error::SendError(event)| {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            event
        })
    }

    fn is_idle(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) == 0
    }
}
