//! # Session
//!
//! One match. Owns every server-side component and runs them in a fixed
//! order each tick. There is no process-wide manager: create one `Session`
//! per match and hand it to whichever driver runs the clock.
//!
//! ## Tick Order
//!
//! ```text
//! 1. Drain every connection queue (non-blocking)
//! 2. Apply disconnects (entity, weapon, history, health gone at once)
//! 3. Movement: release ordered commands, apply or idle-step
//! 4. Record history for every entity, evict past the window
//! 5. Fire / reload in arrival order (against this tick's history)
//! 6. Publish snapshots + acks, then damage, then effects
//! 7. Advance the tick
//! ```

use std::collections::{BTreeMap, BTreeSet};

use ricochet_shared::protocol::tick_time;
use ricochet_shared::{
    AuthoritativeState, DamageEvent, EffectEvent, EntityId, FireRequest, HistoryFrame, StateUpdate,
    Tick, Vec3,
};

use crate::config::NetcodeConfig;
use crate::error::{FireRejection, SessionError, SessionResult};
use crate::geometry::{GeometryQuery, HitboxGeometry, TargetPose};
use crate::history::HistoryStore;
use crate::movement::{FlatGround, MovementModel, MovementPhase, PhysicsModel};
use crate::replication::{LocalReplication, ReplicationChannel};
use crate::server::connection::{Connection, ConnectionHandle, ConnectionState, InboundMessage};
use crate::server::sequencer::{CommandSequencer, PushOutcome};
use crate::server::simulator::AuthoritativeSimulator;
use crate::weapon::{FireOutcome, Weapon};

/// Diagnostic counters for a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Ticks simulated
    pub ticks: u64,
    /// Connections approved
    pub connections: u64,
    /// Connections refused (session full)
    pub refused: u64,
    /// Connections removed
    pub disconnections: u64,
    /// Commands applied
    pub commands_applied: u64,
    /// Commands rejected by validation
    pub commands_rejected: u64,
    /// Commands dropped before application (duplicate, stale or overflow)
    pub commands_dropped: u64,
    /// Commands evicted from a full reorder buffer
    pub commands_overflowed: u64,
    /// Ordering gaps force-advanced
    pub ordering_gaps: u64,
    /// Shots accepted
    pub shots_fired: u64,
    /// Shots that hit
    pub hits: u64,
    /// Fire requests refused
    pub fire_rejections: u64,
    /// Reloads accepted
    pub reloads: u64,
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick that was simulated
    pub tick: Tick,
    /// Commands applied
    pub applied: u32,
    /// Commands rejected
    pub rejected: u32,
    /// Gaps force-advanced
    pub gaps: u32,
    /// Shots accepted
    pub shots: u32,
    /// Hits
    pub hits: u32,
    /// Connections removed
    pub disconnected: u32,
}

#[derive(Clone, Copy, Debug)]
enum WeaponAction {
    Fire(FireRequest),
    Reload,
}

#[derive(Debug)]
struct Player {
    connection: Connection,
    weapon: Weapon,
    health: u32,
}

/// Per-match simulation context.
pub struct Session<R = LocalReplication, G = HitboxGeometry, P = FlatGround> {
    config: NetcodeConfig,
    tick: Tick,
    simulator: AuthoritativeSimulator<P>,
    players: BTreeMap<EntityId, Player>,
    history: HistoryStore,
    replication: R,
    geometry: G,
    next_entity: u32,
    spawned: usize,
    gap_timeout_ticks: u64,
    stats: SessionStats,
    // Scratch, reused every tick
    actions: Vec<(EntityId, WeaponAction)>,
    leaving: Vec<EntityId>,
    poses: Vec<TargetPose>,
    damage: Vec<DamageEvent>,
    effects: Vec<EffectEvent>,
}

impl<R: ReplicationChannel> Session<R, HitboxGeometry, FlatGround> {
    /// Creates a session with hitbox geometry and flat-ground physics.
    #[must_use]
    pub fn new(config: NetcodeConfig, replication: R) -> Self {
        let geometry = HitboxGeometry::new(Vec3::from_array(config.weapon.hitbox_half_extents));
        let physics = FlatGround::from_config(&config.movement);
        Self::with_collaborators(config, replication, geometry, physics)
    }
}

impl<R, G, P> Session<R, G, P>
where
    R: ReplicationChannel,
    G: GeometryQuery,
    P: PhysicsModel,
{
    /// Creates a session with explicit geometry and physics collaborators.
    #[must_use]
    pub fn with_collaborators(config: NetcodeConfig, replication: R, geometry: G, physics: P) -> Self {
        let model = MovementModel::new(config.movement, config.simulation.tick_rate);
        let gap_timeout_ticks = config
            .sequencing
            .gap_timeout_ticks(config.simulation.tick_rate);
        Self {
            history: HistoryStore::new(config.history.window_secs()),
            simulator: AuthoritativeSimulator::new(model, physics),
            players: BTreeMap::new(),
            replication,
            geometry,
            tick: 0,
            next_entity: 1,
            spawned: 0,
            gap_timeout_ticks,
            stats: SessionStats::default(),
            actions: Vec::new(),
            leaving: Vec::new(),
            poses: Vec::new(),
            damage: Vec::new(),
            effects: Vec::new(),
            config,
        }
    }

    /// Approves a new connection and spawns its entity.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionFull`] once `max_players` are connected.
    pub fn connect(&mut self) -> SessionResult<ConnectionHandle> {
        let max = self.config.simulation.max_players;
        if self.players.len() >= max {
            self.stats.refused += 1;
            tracing::warn!(max, "connection refused: session full");
            return Err(SessionError::SessionFull { max });
        }

        let entity = EntityId(self.next_entity);
        self.next_entity += 1;
        let spawn = self.config.simulation.spawn_point(self.spawned);
        self.spawned += 1;

        let sequencer = CommandSequencer::new(self.gap_timeout_ticks, self.config.sequencing.max_pending);
        let (connection, handle) =
            Connection::open(entity, self.config.sequencing.queue_capacity, sequencer, self.tick);

        self.simulator.spawn(entity, spawn);
        self.players.insert(
            entity,
            Player {
                connection,
                weapon: Weapon::new(self.config.weapon, self.config.simulation.tick_rate),
                health: self.config.weapon.max_health,
            },
        );
        self.stats.connections += 1;
        tracing::info!(%entity, x = spawn.x, y = spawn.y, z = spawn.z, "player connected");

        Ok(handle)
    }

    /// Simulates one tick.
    pub fn tick(&mut self) -> TickSummary {
        let mut summary = TickSummary {
            tick: self.tick,
            ..TickSummary::default()
        };
        let now = self.now();

        self.drain_connections();
        summary.disconnected = self.apply_disconnects();
        self.step_movement(&mut summary);
        self.record_history(now);
        let firing = self.resolve_weapons(&mut summary);
        self.publish(&firing);

        self.tick += 1;
        self.stats.ticks += 1;
        summary
    }

    // -------------------------------------------------------------------------
    // Tick phases
    // -------------------------------------------------------------------------

    fn drain_connections(&mut self) {
        for (&entity, player) in &mut self.players {
            while let Some(message) = player.connection.poll() {
                match message {
                    InboundMessage::Input(command) => match player.connection.sequencer.push(command) {
                        PushOutcome::Buffered => {}
                        PushOutcome::Overflowed { .. } => {
                            self.stats.commands_dropped += 1;
                            self.stats.commands_overflowed += 1;
                        }
                        PushOutcome::Duplicate | PushOutcome::Stale => {
                            self.stats.commands_dropped += 1;
                        }
                    },
                    InboundMessage::Fire(request) => {
                        self.actions.push((entity, WeaponAction::Fire(request)));
                    }
                    InboundMessage::Reload => self.actions.push((entity, WeaponAction::Reload)),
                    // poll() consumes leave messages itself
                    InboundMessage::Disconnect => {}
                }
            }
            if player.connection.state() == ConnectionState::Disconnecting {
                self.leaving.push(entity);
            }
        }
    }

    fn apply_disconnects(&mut self) -> u32 {
        let mut removed = 0;
        for entity in self.leaving.drain(..) {
            if self.players.remove(&entity).is_some() {
                self.simulator.despawn(entity);
                self.history.remove(entity);
                self.actions.retain(|(who, _)| *who != entity);
                self.stats.disconnections += 1;
                removed += 1;
                tracing::info!(%entity, "player disconnected");
            }
        }
        removed
    }

    fn step_movement(&mut self, summary: &mut TickSummary) {
        let per_tick = self.config.simulation.max_commands_per_tick;

        for (&entity, player) in &mut self.players {
            let mut consumed = 0;
            while consumed < per_tick {
                let Some(released) = player.connection.sequencer.next_ready(self.tick) else {
                    break;
                };
                consumed += 1;
                if released.skipped > 0 {
                    summary.gaps += 1;
                    self.stats.ordering_gaps += 1;
                }
                match self.simulator.apply_command(entity, &released.command) {
                    Ok(_) => {
                        summary.applied += 1;
                        self.stats.commands_applied += 1;
                    }
                    Err(_) => {
                        summary.rejected += 1;
                        self.stats.commands_rejected += 1;
                    }
                }
            }
            if consumed == 0 {
                self.simulator.idle_step(entity);
            }
        }
    }

    fn record_history(&mut self, now: f32) {
        for (entity, sim) in self.simulator.iter() {
            self.history.record(
                entity,
                HistoryFrame {
                    tick: self.tick,
                    time: now,
                    position: sim.body.position,
                    yaw: sim.body.yaw,
                },
            );
        }
        self.history.evict_older_than(now);
    }

    fn resolve_weapons(&mut self, summary: &mut TickSummary) -> BTreeSet<EntityId> {
        let mut firing = BTreeSet::new();
        if self.actions.is_empty() {
            return firing;
        }
        self.simulator.poses_into(&mut self.poses);

        for (entity, action) in self.actions.drain(..) {
            let Some(player) = self.players.get_mut(&entity) else {
                continue;
            };
            match action {
                WeaponAction::Fire(request) => {
                    let outcome = player.weapon.request_fire(
                        entity,
                        &request,
                        self.tick,
                        &self.history,
                        &self.geometry,
                        &self.poses,
                    );
                    let (hit_point, hit_normal) = match outcome {
                        FireOutcome::Hit {
                            point,
                            normal,
                            damage,
                            ..
                        } => {
                            summary.hits += 1;
                            self.stats.hits += 1;
                            self.damage.push(damage);
                            (Some(point), Some(normal))
                        }
                        FireOutcome::Miss { .. } => (None, None),
                        FireOutcome::Rejected(reason) => {
                            self.stats.fire_rejections += 1;
                            log_rejection(entity, reason);
                            continue;
                        }
                    };
                    summary.shots += 1;
                    self.stats.shots_fired += 1;
                    firing.insert(entity);
                    self.effects.push(EffectEvent::FireWeapon {
                        shooter: entity,
                        origin: request.origin,
                        direction: request.direction,
                        hit_point,
                        hit_normal,
                    });
                }
                WeaponAction::Reload => match player.weapon.request_reload() {
                    Ok(()) => {
                        self.stats.reloads += 1;
                        self.effects.push(EffectEvent::Reload { entity });
                    }
                    Err(reason) => {
                        self.stats.fire_rejections += 1;
                        log_rejection(entity, reason);
                    }
                },
            }
        }

        for event in &self.damage {
            if let Some(target) = self.players.get_mut(&event.target) {
                target.health = target.health.saturating_sub(event.amount);
            }
        }

        firing
    }

    fn publish(&mut self, firing: &BTreeSet<EntityId>) {
        for (entity, sim) in self.simulator.iter() {
            let ammo = self.players.get(&entity).map_or(0, |p| p.weapon.ammo());
            self.replication.publish_state(&StateUpdate {
                tick: self.tick,
                entity,
                state: AuthoritativeState {
                    position: sim.body.position,
                    yaw: sim.body.yaw,
                    vertical_velocity: sim.body.velocity.y,
                    grounded: sim.body.grounded,
                    ammo,
                    firing: firing.contains(&entity),
                },
                ack_sequence: sim.last_processed,
            });
        }
        for event in self.damage.drain(..) {
            self.replication.publish_damage(&event);
        }
        for event in self.effects.drain(..) {
            self.replication.publish_effect(&event);
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Next tick to be simulated
    #[must_use]
    pub const fn current_tick(&self) -> Tick {
        self.tick
    }

    /// Server time (seconds) of the next tick
    #[must_use]
    pub fn now(&self) -> f32 {
        tick_time(self.tick, self.config.simulation.tick_rate)
    }

    /// Connected players
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Connected entities in id order
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.players.keys().copied()
    }

    /// Authoritative snapshot of one entity, as last published
    #[must_use]
    pub fn state(&self, entity: EntityId) -> Option<AuthoritativeState> {
        let sim = self.simulator.entity(entity)?;
        let player = self.players.get(&entity)?;
        Some(AuthoritativeState {
            position: sim.body.position,
            yaw: sim.body.yaw,
            vertical_velocity: sim.body.velocity.y,
            grounded: sim.body.grounded,
            ammo: player.weapon.ammo(),
            firing: false,
        })
    }

    /// Movement phase of one entity
    #[must_use]
    pub fn phase(&self, entity: EntityId) -> Option<MovementPhase> {
        self.simulator.entity(entity).map(|sim| sim.phase)
    }

    /// Last command sequence consumed for one entity
    #[must_use]
    pub fn ack(&self, entity: EntityId) -> Option<u32> {
        self.simulator.last_processed(entity)
    }

    /// Health of one entity
    #[must_use]
    pub fn health(&self, entity: EntityId) -> Option<u32> {
        self.players.get(&entity).map(|p| p.health)
    }

    /// Commands waiting in one entity's reorder buffer
    #[must_use]
    pub fn pending_commands(&self, entity: EntityId) -> Option<usize> {
        self.players
            .get(&entity)
            .map(|p| p.connection.sequencer.pending_len())
    }

    /// Lag-compensation history
    #[must_use]
    pub const fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Replication channel
    #[must_use]
    pub const fn replication(&self) -> &R {
        &self.replication
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &NetcodeConfig {
        &self.config
    }

    /// Diagnostic counters
    #[must_use]
    pub const fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

fn log_rejection(entity: EntityId, reason: FireRejection) {
    match reason {
        // Routine gameplay, not misbehaviour
        FireRejection::OutOfAmmo | FireRejection::MagazineFull => {
            tracing::debug!(%entity, %reason, "weapon action rejected");
        }
        _ => tracing::warn!(%entity, %reason, "weapon action rejected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{NullReplication, Replicated};
    use ricochet_shared::{InputCommand, Vec2};

    fn cmd(sequence: u32, forward: f32) -> InputCommand {
        InputCommand::new(sequence, Vec2::new(0.0, forward), 0.0, 0.0).unwrap()
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(NetcodeConfig::default(), NullReplication);
        assert_eq!(session.current_tick(), 0);
        assert_eq!(session.player_count(), 0);
    }

    #[test]
    fn test_connect_spawns_round_robin() {
        let mut config = NetcodeConfig::default();
        config.simulation.spawn_points = vec![[1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let mut session = Session::new(config, NullReplication);

        let a = session.connect().unwrap();
        let b = session.connect().unwrap();
        let c = session.connect().unwrap();

        assert_eq!(session.state(a.entity()).unwrap().position.x, 1.0);
        assert_eq!(session.state(b.entity()).unwrap().position.x, 2.0);
        assert_eq!(session.state(c.entity()).unwrap().position.x, 1.0);
        assert_eq!(session.health(a.entity()), Some(100));
    }

    #[test]
    fn test_session_full() {
        let mut config = NetcodeConfig::default();
        config.simulation.max_players = 2;
        let mut session = Session::new(config, NullReplication);

        let _a = session.connect().unwrap();
        let _b = session.connect().unwrap();
        assert_eq!(
            session.connect().unwrap_err(),
            SessionError::SessionFull { max: 2 }
        );
        assert_eq!(session.stats().refused, 1);
    }

    #[test]
    fn test_one_command_per_tick() {
        let mut session = Session::new(NetcodeConfig::default(), NullReplication);
        let handle = session.connect().unwrap();
        for seq in 1..=3 {
            handle.send_input(cmd(seq, 1.0)).unwrap();
        }

        session.tick();
        assert_eq!(session.ack(handle.entity()), Some(1));
        session.tick();
        session.tick();
        assert_eq!(session.ack(handle.entity()), Some(3));

        let z = session.state(handle.entity()).unwrap().position.z;
        assert!((z - 3.0 * 5.0 / 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_reordering_across_ticks() {
        let mut session = Session::new(NetcodeConfig::default(), NullReplication);
        let handle = session.connect().unwrap();
        let entity = handle.entity();

        handle.send_input(cmd(3, 1.0)).unwrap();
        session.tick();
        assert_eq!(session.ack(entity), None);

        handle.send_input(cmd(1, 1.0)).unwrap();
        handle.send_input(cmd(2, 1.0)).unwrap();
        let mut acks = Vec::new();
        for _ in 0..3 {
            session.tick();
            acks.push(session.ack(entity));
        }

        assert_eq!(acks, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(session.stats().commands_dropped, 0);
        assert_eq!(session.stats().ordering_gaps, 0);
    }

    #[test]
    fn test_fast_sender_reorder_buffer_bounded() {
        let mut session = Session::new(NetcodeConfig::default(), NullReplication);
        let handle = session.connect().unwrap();
        let entity = handle.entity();
        let max_pending = session.config().sequencing.max_pending;

        let mut sent = 0;
        for _ in 0..600 {
            for _ in 0..2 {
                sent += 1;
                handle.send_input(cmd(sent, 1.0)).unwrap();
            }
            session.tick();
            assert!(session.pending_commands(entity).unwrap() <= max_pending);
        }

        let ack = session.ack(entity).unwrap();
        assert!(sent - ack <= max_pending as u32, "ack {ack}, sent {sent}");
        assert!(session.stats().commands_overflowed > 0);
    }

    #[test]
    fn test_publishes_state_with_ack() {
        let replication = LocalReplication::new(64);
        let rx = replication.subscribe();
        let mut session = Session::new(NetcodeConfig::default(), replication);
        let handle = session.connect().unwrap();
        handle.send_input(cmd(1, 1.0)).unwrap();

        session.tick();

        let update = rx
            .try_iter()
            .find_map(|m| m.state_for(handle.entity()).copied())
            .unwrap();
        assert_eq!(update.tick, 0);
        assert_eq!(update.ack_sequence, Some(1));
        assert_eq!(update.state.ammo, 30);
        assert!(!update.state.firing);
    }

    #[test]
    fn test_disconnect_at_tick_boundary() {
        let mut session = Session::new(NetcodeConfig::default(), NullReplication);
        let handle = session.connect().unwrap();
        let entity = handle.entity();
        session.tick();
        assert!(session.history().newest(entity).is_some());

        handle.send_input(cmd(1, 1.0)).unwrap();
        handle.send_fire(FireRequest::new(Vec3::ZERO, Vec3::Z, 0.0)).unwrap();
        handle.disconnect();

        let summary = session.tick();
        assert_eq!(summary.disconnected, 1);
        assert_eq!(summary.shots, 0);
        assert_eq!(summary.applied, 0);
        assert_eq!(session.player_count(), 0);
        assert!(session.history().newest(entity).is_none());
        assert!(session.health(entity).is_none());
    }

    #[test]
    fn test_fire_and_damage() {
        let mut config = NetcodeConfig::default();
        config.simulation.spawn_points = vec![[0.0, 0.0, 0.0], [0.0, 0.0, 10.0]];
        let replication = LocalReplication::new(64);
        let rx = replication.subscribe();
        let mut session = Session::new(config, replication);
        let shooter = session.connect().unwrap();
        let target = session.connect().unwrap();
        session.tick();

        let now = session.now();
        shooter
            .send_fire(FireRequest::new(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, now))
            .unwrap();
        let summary = session.tick();

        assert_eq!(summary.hits, 1);
        assert_eq!(session.health(target.entity()), Some(75));
        assert_eq!(session.state(shooter.entity()).unwrap().ammo, 29);

        let messages: Vec<Replicated> = rx.try_iter().collect();
        assert!(messages.iter().any(|m| matches!(
            m,
            Replicated::Damage(DamageEvent { amount: 25, .. })
        )));
        assert!(messages.iter().any(|m| matches!(
            m,
            Replicated::Effect(EffectEvent::FireWeapon { hit_point: Some(_), .. })
        )));
        assert!(messages.iter().any(|m| matches!(
            m,
            Replicated::State(StateUpdate { state: AuthoritativeState { firing: true, .. }, .. })
        )));
    }

    #[test]
    fn test_reload_full_rejected() {
        let mut session = Session::new(NetcodeConfig::default(), NullReplication);
        let handle = session.connect().unwrap();
        handle.send_reload().unwrap();
        session.tick();

        assert_eq!(session.stats().reloads, 0);
        assert_eq!(session.stats().fire_rejections, 1);
    }
}
