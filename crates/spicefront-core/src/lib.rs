//! Object model and value parsing shared by the spicefront crates.
//!
//! A netlist is a title plus an ordered list of [`Statement`]s; statements
//! carry their arguments as [`Parameter`]s that keep the source text.

pub mod netlist;
pub mod parameter;
pub mod units;

pub use netlist::{Netlist, Statement, SubcircuitDefinition};
pub use parameter::Parameter;
pub use units::parse_value;
