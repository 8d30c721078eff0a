//! Point and gridded snowpack energy and mass balance simulation driver.
//!
//! A run validates a forcing table and a TOML configuration, builds the
//! adaptive timestep hierarchy and the initial snowpack, then steps an
//! integration [`Kernel`](sim::types::Kernel) over every consecutive pair of
//! forcing samples, collecting one output row per data interval.

pub mod cli;
pub mod config;
pub mod error;
pub mod forcing;
pub mod io;
pub mod names;
/// Reference physics kernel.
pub mod physics;
/// Driver, timestep hierarchy, state, and output modules.
pub mod sim;

pub use config::{RunConfig, SnobalConfig};
pub use error::{ConfigError, SnobalError};
pub use forcing::ForcingTable;
pub use physics::PointKernel;
pub use sim::engine::run_snobal;
pub use sim::output::OutputTable;
