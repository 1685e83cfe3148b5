//! Game control loop.
//!
//! [`GameLoop`] is the single writer of game state. It drains three bounded
//! queues (register, unregister, broadcast) and a fixed-period timer, and
//! handles one event at a time, so registration and fan-out never overlap a
//! physics step. Connection handlers talk to it through [`GameHandle`].

use super::broadcast::{self, DeliveryFailure};
use super::registry::{Departure, RegisterOptions, SessionRegistry};
use super::session::{Connection, Session, SessionId};
use crate::config::Config;
use crate::error::GameError;
use crate::world::{World, WorldStore};
use bytes::Bytes;
use protocol::{PlayerUpdate, ServerMessage};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

/// Cloneable handle used by the transport to feed events into the loop.
#[derive(Debug, Clone)]
pub struct GameHandle {
    register_tx: mpsc::Sender<Session>,
    unregister_tx: mpsc::Sender<SessionId>,
    broadcast_tx: mpsc::Sender<Bytes>,
    world: WorldStore,
    next_session_id: Arc<AtomicU64>,
    outbound_capacity: usize,
}

impl GameHandle {
    /// Accept a new connection: allocate its session and outbound buffer.
    pub fn connect(&self) -> Connection {
        let id = SessionId::new(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        debug!("Session {} connecting", id);
        Connection::new(id, self.outbound_capacity)
    }

    /// Queue a register request. Returns `Ok(false)` if this connection has
    /// already asked to register.
    pub async fn register(&self, conn: &mut Connection, name: String) -> Result<bool, GameError> {
        let Some(session) = conn.take_session(name) else {
            debug!("Duplicate register from session {}", conn.id());
            return Ok(false);
        };
        self.register_tx
            .send(session)
            .await
            .map_err(|_| GameError::LoopClosed)?;
        Ok(true)
    }

    /// Apply an input update to the connection's player directly under the
    /// world lock. Returns false if no player is bound or it no longer exists.
    pub async fn update_player(&self, conn: &Connection, update: &PlayerUpdate) -> bool {
        match conn.player_id() {
            Some(player_id) => self.world.apply_input(player_id, update).await,
            None => false,
        }
    }

    /// Queue the one deregistration for this connection.
    pub async fn unregister(&self, conn: Connection) -> Result<(), GameError> {
        self.unregister_tx
            .send(conn.id())
            .await
            .map_err(|_| GameError::LoopClosed)
    }

    /// Queue a pre-serialized payload for delivery to every session.
    pub async fn broadcast(&self, payload: Bytes) -> Result<(), GameError> {
        self.broadcast_tx
            .send(payload)
            .await
            .map_err(|_| GameError::LoopClosed)
    }

    pub fn world(&self) -> &WorldStore {
        &self.world
    }
}

/// The single-writer control loop.
pub struct GameLoop {
    config: Config,
    world: WorldStore,
    registry: SessionRegistry,

    register_rx: mpsc::Receiver<Session>,
    unregister_rx: mpsc::Receiver<SessionId>,
    broadcast_rx: mpsc::Receiver<Bytes>,

    tick_count: u64,
    /// Average tick duration in milliseconds (exponential moving average).
    update_time_avg: f64,
}

impl GameLoop {
    /// Build the world (with its initial food and viruses), the queues and a
    /// handle to them.
    pub fn new(config: Config) -> (Self, GameHandle) {
        let capacity = config.server.queue_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);

        let world = World::populated(&config);
        let counts = world.cell_counts();
        info!(
            "World initialized: {} food, {} viruses",
            counts.food, counts.viruses
        );
        let world = WorldStore::new(world);

        let handle = GameHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            world: world.clone(),
            next_session_id: Arc::new(AtomicU64::new(1)),
            outbound_capacity: config.server.outbound_capacity,
        };

        let game = Self {
            config,
            world,
            registry: SessionRegistry::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            tick_count: 0,
            update_time_avg: 0.0,
        };
        (game, handle)
    }

    /// Build a loop and run it on the current runtime.
    pub fn spawn(config: Config) -> (GameHandle, JoinHandle<()>) {
        let (game, handle) = Self::new(config);
        (handle, tokio::spawn(game.run()))
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn world(&self) -> &WorldStore {
        &self.world
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Run until every [`GameHandle`] has been dropped.
    pub async fn run(mut self) {
        let period = self.config.server.tick_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Game loop running at {:?} per tick", period);

        loop {
            tokio::select! {
                biased;

                session = self.register_rx.recv() => match session {
                    Some(session) => self.handle_register(session).await,
                    None => break,
                },
                Some(id) = self.unregister_rx.recv() => {
                    self.handle_unregister(id).await;
                }
                Some(payload) = self.broadcast_rx.recv() => {
                    self.deliver(payload, None).await;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Game loop stopped after {} ticks", self.tick_count);
    }

    pub async fn handle_register(&mut self, session: Session) {
        let options = RegisterOptions {
            init_timeout: self.config.server.init_timeout(),
            max_name_length: self.config.server.max_name_length,
        };
        let Some(registration) = self.registry.register(session, &self.world, options).await
        else {
            return;
        };

        let joined = ServerMessage::PlayerJoined {
            player: registration.player,
        };
        self.publish(&joined, Some(registration.session_id)).await;
    }

    pub async fn handle_unregister(&mut self, id: SessionId) {
        if let Some(left) = self.remove_session(id, Departure::Disconnected).await {
            self.deliver(left, None).await;
        }
    }

    /// One physics step followed by its broadcasts.
    pub async fn tick(&mut self) {
        let tick_start = std::time::Instant::now();

        // Step and snapshot under one write lock so no partial tick is seen.
        let (report, state) = {
            let mut world = self.world.write().await;
            let report = world.step(std::time::Instant::now());
            (report, world.snapshot())
        };
        self.tick_count += 1;
        debug!(
            "Tick #{}: {} food spawned, {} viruses spawned, {} food eaten, {} players eaten",
            self.tick_count,
            report.food_spawned,
            report.viruses_spawned,
            report.food_eaten,
            report.eaten_players.len()
        );

        for player_id in &report.eaten_players {
            info!("Player {} was eaten", player_id);
            let left = ServerMessage::PlayerLeft {
                player_id: player_id.to_string(),
            };
            self.publish(&left, None).await;
        }
        self.publish(&ServerMessage::Update { state }, None).await;

        let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;
        self.update_time_avg = self.update_time_avg * 0.5 + tick_ms * 0.5;
        let tick_budget = self.config.server.tick_interval_ms as f64 * 0.9;
        if tick_ms > tick_budget {
            warn!(
                "Slow tick #{}: {:.3}ms (budget: {:.1}ms) - {} sessions",
                self.tick_count,
                tick_ms,
                tick_budget,
                self.registry.len()
            );
        }
    }

    /// Serialize once and fan out. Serialization failures skip the message.
    async fn publish(&mut self, message: &ServerMessage, except: Option<SessionId>) {
        match message.encode() {
            Ok(payload) => self.deliver(payload, except).await,
            Err(e) => warn!("Failed to serialize {}: {}", message.kind(), e),
        }
    }

    /// Fan out a payload, evicting sessions that cannot take it. Evictions
    /// produce departures, which are fanned out in turn.
    async fn deliver(&mut self, payload: Bytes, except: Option<SessionId>) {
        let mut pending = VecDeque::from([(payload, except)]);
        while let Some((payload, except)) = pending.pop_front() {
            for (id, failure) in broadcast::fan_out(&self.registry, &payload, except) {
                if failure == DeliveryFailure::Full {
                    warn!("Session {} outbound buffer full, evicting", id);
                }
                if let Some(left) = self.remove_session(id, Departure::Unresponsive).await {
                    pending.push_back((left, None));
                }
            }
        }
    }

    /// Unregister a session. Returns the encoded departure when a player was
    /// actually removed.
    async fn remove_session(&mut self, id: SessionId, departure: Departure) -> Option<Bytes> {
        let player_id = self.registry.unregister(id, &self.world, departure).await?;
        let left = ServerMessage::PlayerLeft {
            player_id: player_id.to_string(),
        };
        match left.encode() {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("Failed to serialize PLAYER_LEFT: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Cell, EntityId};
    use crate::server::session::SessionState;
    use glam::DVec2;
    use protocol::WorldState;
    use std::time::Duration;
    use crate::server::session::Outbox;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.food.initial_amount = 0;
        config.food.min_amount = 0;
        config.virus.amount = 0;
        config.server.init_timeout_ms = 10;
        config
    }

    /// Handle everything currently queued, without the timer.
    async fn pump(game: &mut GameLoop) {
        loop {
            if let Ok(session) = game.register_rx.try_recv() {
                game.handle_register(session).await;
            } else if let Ok(id) = game.unregister_rx.try_recv() {
                game.handle_unregister(id).await;
            } else if let Ok(payload) = game.broadcast_rx.try_recv() {
                game.deliver(payload, None).await;
            } else {
                break;
            }
        }
    }

    async fn join(
        game: &mut GameLoop,
        handle: &GameHandle,
        name: &str,
    ) -> (Connection, Outbox) {
        let mut conn = handle.connect();
        let rx = conn.take_outbound().unwrap();
        assert!(handle.register(&mut conn, name.to_string()).await.unwrap());
        pump(game).await;
        (conn, rx)
    }

    fn drain(rx: &Outbox) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            messages.push(ServerMessage::decode(&payload).unwrap());
        }
        messages
    }

    fn last_update(messages: &[ServerMessage]) -> &WorldState {
        messages
            .iter()
            .rev()
            .find_map(|m| match m {
                ServerMessage::Update { state } => Some(state),
                _ => None,
            })
            .expect("no UPDATE received")
    }

    /// Move a player out of the way of test fixtures.
    async fn park(game: &GameLoop, id: EntityId) {
        let mut world = game.world.write().await;
        world.players.get_mut(&id).unwrap().data_mut().position = DVec2::new(9000.0, 9000.0);
    }

    #[tokio::test]
    async fn test_register_sends_init_with_new_player() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let (conn, rx) = join(&mut game, &handle, "alice").await;

        let messages = drain(&rx);
        assert_eq!(messages.len(), 1);
        let ServerMessage::Init { player_id, state } = &messages[0] else {
            panic!("expected INIT, got {}", messages[0].kind());
        };
        assert_eq!(*player_id, conn.player_id().unwrap().to_string());

        let player = state.player(player_id).unwrap();
        assert_eq!(player.name, "alice");
        assert_eq!(player.mass, 10.0);
        assert!((player.radius - (1000.0 / std::f64::consts::PI).sqrt()).abs() < 1e-9);
        assert!((player.radius - 17.84).abs() < 0.01);
        assert_eq!(
            game.registry().get(conn.id()).unwrap().state(),
            SessionState::Active
        );
    }

    #[tokio::test]
    async fn test_join_is_announced_to_others_only() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let (_a, rx_a) = join(&mut game, &handle, "a").await;
        drain(&rx_a);
        let (b, rx_b) = join(&mut game, &handle, "b").await;

        let to_a = drain(&rx_a);
        assert_eq!(to_a.len(), 1);
        let ServerMessage::PlayerJoined { player } = &to_a[0] else {
            panic!("expected PLAYER_JOINED, got {}", to_a[0].kind());
        };
        assert_eq!(player.id, b.player_id().unwrap().to_string());

        let to_b = drain(&rx_b);
        assert_eq!(to_b.len(), 1);
        let ServerMessage::Init { state, .. } = &to_b[0] else {
            panic!("expected INIT, got {}", to_b[0].kind());
        };
        assert_eq!(state.players.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_register_is_ignored() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let (mut conn, rx) = join(&mut game, &handle, "alice").await;
        drain(&rx);
        let first = conn.player_id();

        assert!(!handle.register(&mut conn, "again".to_string()).await.unwrap());
        pump(&mut game).await;

        assert_eq!(conn.player_id(), first);
        assert_eq!(game.world.read().await.cell_counts().players, 1);
        assert!(drain(&rx).is_empty());
    }

    #[tokio::test]
    async fn test_unregister_twice_sends_one_departure() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let (_a, rx_a) = join(&mut game, &handle, "a").await;
        let (b, _rx_b) = join(&mut game, &handle, "b").await;
        drain(&rx_a);
        let b_id = b.id();
        let b_player = b.player_id().unwrap();

        handle.unregister(b).await.unwrap();
        pump(&mut game).await;
        game.handle_unregister(b_id).await;

        let to_a = drain(&rx_a);
        assert_eq!(
            to_a,
            vec![ServerMessage::PlayerLeft {
                player_id: b_player.to_string()
            }]
        );
        assert!(!game.registry().contains(b_id));
        assert!(game.world.read().await.player(b_player).is_none());
    }

    #[tokio::test]
    async fn test_unregister_unknown_session_is_noop() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let (_a, rx_a) = join(&mut game, &handle, "a").await;
        drain(&rx_a);

        // Connected but never registered.
        let never = handle.connect();
        handle.unregister(never).await.unwrap();
        pump(&mut game).await;

        assert!(drain(&rx_a).is_empty());
        assert_eq!(game.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_tick_broadcasts_update() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let (conn, rx) = join(&mut game, &handle, "a").await;
        drain(&rx);

        game.tick().await;
        let messages = drain(&rx);
        assert_eq!(messages.len(), 1);
        let state = last_update(&messages);
        assert!(state.player(&conn.player_id().unwrap().to_string()).is_some());
        assert_eq!(game.tick_count(), 1);
    }

    #[tokio::test]
    async fn test_larger_player_eats_smaller_and_departure_is_broadcast() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let (observer, rx) = join(&mut game, &handle, "observer").await;
        park(&game, observer.player_id().unwrap()).await;
        drain(&rx);

        let (x, y) = {
            let mut world = game.world.write().await;
            let x = world.add_player_at("x".to_string(), DVec2::new(500.0, 500.0), 100.0);
            let y = world.add_player_at("y".to_string(), DVec2::new(530.0, 500.0), 50.0);
            (x, y)
        };

        game.tick().await;
        let messages = drain(&rx);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            ServerMessage::PlayerLeft {
                player_id: y.to_string()
            }
        );
        let state = last_update(&messages);
        assert_eq!(state.player(&x.to_string()).unwrap().mass, 150.0);
        assert!(state.player(&y.to_string()).is_none());
    }

    #[tokio::test]
    async fn test_near_equal_players_do_not_eat() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let (observer, rx) = join(&mut game, &handle, "observer").await;
        park(&game, observer.player_id().unwrap()).await;
        drain(&rx);

        let (z, w) = {
            let mut world = game.world.write().await;
            let z = world.add_player_at("z".to_string(), DVec2::new(500.0, 500.0), 100.0);
            let w = world.add_player_at("w".to_string(), DVec2::new(520.0, 500.0), 90.0);
            (z, w)
        };

        game.tick().await;
        let messages = drain(&rx);
        assert_eq!(messages.len(), 1);
        let state = last_update(&messages);
        assert_eq!(state.player(&z.to_string()).unwrap().mass, 100.0);
        assert_eq!(state.player(&w.to_string()).unwrap().mass, 90.0);
    }

    #[tokio::test]
    async fn test_player_eats_food_on_tick() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let (conn, rx) = join(&mut game, &handle, "x").await;
        let player_id = conn.player_id().unwrap();
        drain(&rx);

        let food = {
            let mut world = game.world.write().await;
            let player = world.players.get_mut(&player_id).unwrap();
            player.data_mut().position = DVec2::new(1000.0, 1000.0);
            player.data_mut().set_mass(50.0);
            world.add_food_at(DVec2::new(1020.0, 1000.0))
        };

        game.tick().await;
        let messages = drain(&rx);
        let state = last_update(&messages);
        assert_eq!(state.player(&player_id.to_string()).unwrap().mass, 55.0);
        assert!(state.foods.iter().all(|f| f.id != food.to_string()));
    }

    #[tokio::test]
    async fn test_update_player_through_handle() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let mut conn = handle.connect();
        let _rx = conn.take_outbound().unwrap();

        let update = PlayerUpdate {
            x: Some(4321.0),
            ..Default::default()
        };
        // Not yet registered.
        assert!(!handle.update_player(&conn, &update).await);

        handle.register(&mut conn, "p".to_string()).await.unwrap();
        pump(&mut game).await;
        assert!(handle.update_player(&conn, &update).await);

        let world = game.world.read().await;
        let player = world.player(conn.player_id().unwrap()).unwrap();
        assert_eq!(player.position().x, 4321.0);
    }

    #[tokio::test]
    async fn test_saturated_session_is_evicted_without_stalling_others() {
        let mut config = quiet_config();
        config.server.outbound_capacity = 2;
        let (mut game, handle) = GameLoop::new(config);

        let (slow, slow_rx) = join(&mut game, &handle, "slow").await;
        let (fast, fast_rx) = join(&mut game, &handle, "fast").await;
        let slow_player = slow.player_id().unwrap();
        drain(&fast_rx);

        // INIT + PLAYER_JOINED fill the slow session's two slots.
        game.tick().await;
        assert!(!game.registry().contains(slow.id()));
        assert!(game.world.read().await.player(slow_player).is_none());

        let to_fast = drain(&fast_rx);
        assert_eq!(to_fast.len(), 2);
        assert_eq!(to_fast[0].kind(), "UPDATE");
        assert_eq!(
            to_fast[1],
            ServerMessage::PlayerLeft {
                player_id: slow_player.to_string()
            }
        );

        game.tick().await;
        let to_fast = drain(&fast_rx);
        let state = last_update(&to_fast);
        assert!(state.player(&slow_player.to_string()).is_none());
        assert!(state.player(&fast.player_id().unwrap().to_string()).is_some());

        // The evicted session gets what was buffered, then a closed channel.
        assert_eq!(drain(&slow_rx).len(), 2);
        assert!(slow_rx.recv().await.is_none());

        // The later transport disconnect changes nothing.
        handle.unregister(slow).await.unwrap();
        pump(&mut game).await;
        assert!(drain(&fast_rx).is_empty());
    }

    #[tokio::test]
    async fn test_external_broadcast_reaches_all_sessions() {
        let (mut game, handle) = GameLoop::new(quiet_config());
        let (_a, rx_a) = join(&mut game, &handle, "a").await;
        let (_b, rx_b) = join(&mut game, &handle, "b").await;
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        let payload = Bytes::from_static(br#"{"type":"UPDATE","state":{"players":[],"foods":[],"viruses":[]}}"#);
        handle.broadcast(payload.clone()).await.unwrap();
        pump(&mut game).await;

        assert_eq!(rx_a.try_recv().unwrap(), payload);
        assert_eq!(rx_b.try_recv().unwrap(), payload);
    }

    #[tokio::test]
    async fn test_world_starts_populated() {
        let (game, _handle) = GameLoop::new(Config::default());
        let counts = game.world.read().await.cell_counts();
        assert_eq!(counts.food, 200);
        assert_eq!(counts.viruses, 10);
    }

    #[tokio::test]
    async fn test_run_loop_ticks_and_stops_with_handles() {
        let mut config = quiet_config();
        config.server.tick_interval_ms = 10;
        let (handle, task) = GameLoop::spawn(config);

        let mut conn = handle.connect();
        let rx = conn.take_outbound().unwrap();
        handle.register(&mut conn, "runner".to_string()).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ServerMessage::decode(&first).unwrap().kind(), "INIT");

        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ServerMessage::decode(&second).unwrap().kind(), "UPDATE");

        drop(handle);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_loop() {
        let (game, handle) = GameLoop::new(quiet_config());
        drop(game);
        let mut conn = handle.connect();
        assert!(matches!(
            handle.register(&mut conn, "late".to_string()).await,
            Err(GameError::LoopClosed)
        ));
    }
}
