//! # Authoritative Server
//!
//! Fixed-tick, single-writer simulation of one match.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SESSION                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌────────────────────┐   │
//! │  │ Connection │──►│ Sequencer  │──►│ Simulator          │   │
//! │  │ (SPSC rx)  │   │ (reorder)  │   │ (movement truth)   │   │
//! │  └────────────┘   └────────────┘   └─────────┬──────────┘   │
//! │        │                                     ▼              │
//! │        │ fire / reload              ┌────────────────────┐  │
//! │        └───────────────────────────►│ Weapon + History   │  │
//! │                                     │ (lag compensation) │  │
//! │                                     └─────────┬──────────┘  │
//! │                                               ▼             │
//! │                                     ┌────────────────────┐  │
//! │                                     │ Replication        │  │
//! │                                     └────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transport threads only ever touch their [`ConnectionHandle`]. Everything
//! else is owned by the thread calling [`Session::tick`].

pub mod connection;
pub mod sequencer;
pub mod session;
pub mod simulator;
pub mod tick;

pub use connection::{Connection, ConnectionHandle, ConnectionState, InboundMessage};
pub use sequencer::{CommandSequencer, PushOutcome, Released, SequencerStats, FIRST_SEQUENCE};
pub use session::{Session, SessionStats, TickSummary};
pub use simulator::{AuthoritativeSimulator, SimEntity, SimulatorStats};
pub use tick::{TickLoop, TickStats, MAX_CATCH_UP_TICKS};
