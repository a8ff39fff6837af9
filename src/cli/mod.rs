//! Command-line interface

pub mod args;

pub use args::{parse_args, Args, Command, PlanCommand, ResolveAs};
