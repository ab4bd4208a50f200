//! A no-alloc, `no_std` core combining two independent subsystems that
//! share the same timed-event scheduler and fixed-point conventions:
//!
//! - `net` (feature `net`): a from-scratch Ethernet/ARP/IPv4/ICMP/TCP
//!   stack driven entirely by an external [`net::driver::EthernetDriver`].
//! - `motion` (feature `motion`): a multi-axis lookahead motion planner
//!   and fixed-point step generator.
//!
//! Both subsystems are driven from a single-threaded cooperative event
//! loop built on [`scheduler::Scheduler`]; neither subsystem allocates
//! after construction (spec §2, §5, §9).
#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod buf;
pub mod config;
pub mod fixed;
mod log_macros;
pub mod scheduler;
pub mod time;

#[cfg(feature = "motion")]
pub mod motion;

#[cfg(feature = "net")]
pub mod net;

#[cfg(feature = "net")]
pub use net::error::{NetError, NetResult};

#[cfg(feature = "motion")]
pub use motion::{MotionPlanner, PlannerState};

pub use config::{DefaultConfig, DefaultSizes, MotionConfig, NetConfig};
pub use scheduler::Scheduler;
pub use time::{Duration, Instant};
