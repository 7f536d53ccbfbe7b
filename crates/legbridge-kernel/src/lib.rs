//! `legbridge-kernel` – command execution.
//!
//! Turns requests from the middleware into robot commands and owns the
//! shared mobility configuration.  It never raises across its boundary:
//! every request ends in exactly one
//! [`CommandResult`][legbridge_types::CommandResult].
//!
//! # Modules
//!
//! - [`mobility`] – [`MobilityStore`][mobility::MobilityStore]: the single
//!   live mobility configuration, mutated under one lock per
//!   read-modify-write cycle.
//! - [`command_executor`] – [`CommandExecutor`][command_executor::CommandExecutor]:
//!   one method per discrete command plus typed dispatch via
//!   [`Command`][legbridge_types::Command]; panics and errors become failed
//!   results.
//! - [`boot`] – [`BootSequence`][boot::BootSequence]: gated
//!   claim → power-on → stand at startup.

pub mod boot;
pub mod command_executor;
pub mod mobility;

pub use boot::{BootReport, BootSequence};
pub use command_executor::CommandExecutor;
pub use mobility::MobilityStore;
