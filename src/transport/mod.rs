//! Transport supervision: stream with retry, polling fallback, probes back
//! to the stream

pub mod polling;
pub mod state;
pub mod supervisor;

pub use state::{backoff, ConnectionState, Phase, TransportKind};
pub use supervisor::{SessionPlan, SupervisorSettings, TransportDeps, TransportSupervisor};
