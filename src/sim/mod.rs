pub mod engine;
pub mod output;
pub mod state;
pub mod timestep;
pub mod types;
