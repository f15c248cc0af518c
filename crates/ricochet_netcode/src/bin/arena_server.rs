//! # Arena Server
//!
//! Headless authoritative server for one match, driven by scripted bots.
//! Useful for soak-testing the tick pipeline without a transport.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=ricochet_netcode=debug arena_server --config arena.toml --bots 6 --duration 30
//! ```

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ricochet_netcode::{ConnectionHandle, LocalReplication, NetcodeConfig, Session, TickLoop};
use ricochet_shared::{FireRequest, InputCommand, Vec2, Vec3};
use tracing_subscriber::EnvFilter;

/// Muzzle height above the feet.
const EYE_HEIGHT: f32 = 1.6;

struct Bot {
    handle: ConnectionHandle,
    sequence: u32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         RICOCHET ARENA SERVER                                    ║");
    println!("║         ONE SOURCE OF TRUTH                                      ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // Parse command line arguments (simple parsing, no external deps)
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut bots = 4usize;
    let mut duration_secs: Option<u64> = None;
    let mut seed = 7u64;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--bots" | "-b" => {
                if i + 1 < args.len() {
                    bots = args[i + 1].parse().unwrap_or(4);
                    i += 1;
                }
            }
            "--duration" | "-d" => {
                if i + 1 < args.len() {
                    duration_secs = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--seed" | "-s" => {
                if i + 1 < args.len() {
                    seed = args[i + 1].parse().unwrap_or(7);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: arena_server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>        TOML configuration (default: built-in)");
                println!("  -b, --bots <NUM>           Scripted bots to connect (default: 4)");
                println!("  -d, --duration <SECS>      Run for N seconds then exit");
                println!("  -s, --seed <SEED>          Bot RNG seed (default: 7)");
                println!("  -h, --help                 Show this help");
                return;
            }
            other => tracing::warn!(argument = other, "ignoring unknown argument"),
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => match NetcodeConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(%path, error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => NetcodeConfig::default(),
    };

    let tick_rate = config.simulation.tick_rate;
    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Tick Rate:          {tick_rate} Hz");
    println!("│ Max Players:        {}", config.simulation.max_players);
    println!("│ Bots:               {bots}");
    println!("│ Gap Timeout:        {} ms", config.sequencing.gap_timeout_ms);
    println!("│ History Window:     {} ms", config.history.window_ms);
    match duration_secs {
        Some(d) => println!("│ Duration:           {d} seconds"),
        None => println!("│ Duration:           infinite"),
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let mut session = Session::new(config, LocalReplication::default());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut roster = Vec::with_capacity(bots);
    for _ in 0..bots {
        match session.connect() {
            Ok(handle) => roster.push(Bot {
                handle,
                sequence: 0,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "bot could not join");
                break;
            }
        }
    }

    let mut tick_loop = TickLoop::new(tick_rate);
    let start = Instant::now();
    let mut last_stats_tick = 0u64;
    let stats_interval = u64::from(tick_rate) * 5; // Every 5 seconds

    loop {
        if let Some(duration) = duration_secs {
            if start.elapsed().as_secs() >= duration {
                break;
            }
        }

        tick_loop.wait_for_next_tick();

        while tick_loop.should_tick() {
            let now = session.now();
            for bot in &mut roster {
                drive_bot(bot, &session, &mut rng, now);
            }

            let tick_start = tick_loop.begin_tick();
            session.tick();
            tick_loop.end_tick(tick_start);

            let current_tick = tick_loop.tick_count();
            if current_tick - last_stats_tick >= stats_interval {
                last_stats_tick = current_tick;
                let timing = tick_loop.stats();
                let stats = session.stats();
                tracing::info!(
                    tick = current_tick,
                    players = session.player_count(),
                    applied = stats.commands_applied,
                    rejected = stats.commands_rejected,
                    shots = stats.shots_fired,
                    hits = stats.hits,
                    avg_tick_us = timing.avg_tick_us,
                    late_ticks = timing.late_ticks,
                    dropped_ticks = timing.dropped_ticks,
                    "server status"
                );
            }
        }
    }

    let stats = session.stats();
    println!();
    println!("┌─ FINAL STATISTICS ──────────────────────────────────────────────┐");
    println!("│ Ticks:              {}", stats.ticks);
    println!("│ Commands Applied:   {}", stats.commands_applied);
    println!("│ Commands Rejected:  {}", stats.commands_rejected);
    println!("│ Ordering Gaps:      {}", stats.ordering_gaps);
    println!("│ Shots / Hits:       {} / {}", stats.shots_fired, stats.hits);
    println!("│ Reloads:            {}", stats.reloads);
    println!("│ Commands Dropped:   {}", stats.commands_dropped);
    let timing = tick_loop.stats();
    println!("│ Late / Dropped:     {} / {}", timing.late_ticks, timing.dropped_ticks);
    println!("└──────────────────────────────────────────────────────────────────┘");
}

/// One tick of scripted intent: wander, turn, hop now and then, shoot
/// straight ahead, reload when dry.
fn drive_bot(bot: &mut Bot, session: &Session, rng: &mut StdRng, now: f32) {
    bot.sequence += 1;
    let look: f32 = rng.gen_range(-30.0..30.0);
    let forward: f32 = rng.gen_range(0.3..1.0);

    let mut command = match InputCommand::new(bot.sequence, Vec2::new(0.0, forward), look, now) {
        Ok(command) => command,
        Err(err) => {
            tracing::debug!(error = %err, "bot produced an invalid command");
            return;
        }
    };
    if rng.gen_bool(0.02) {
        command = command.with_jump();
    }
    if bot.handle.send_input(command).is_err() {
        return;
    }

    let entity = bot.handle.entity();
    let Some(state) = session.state(entity) else {
        return;
    };

    if state.ammo == 0 {
        let _ = bot.handle.send_reload();
    } else if rng.gen_bool(0.1) {
        let direction = ricochet_shared::math::yaw_to_world(Vec2::new(0.0, 1.0), state.yaw);
        let origin = state.position + Vec3::new(0.0, EYE_HEIGHT, 0.0);
        let _ = bot.handle.send_fire(FireRequest::new(origin, direction, now));
    }
}
