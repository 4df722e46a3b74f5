#![warn(missing_debug_implementations)]
#![deny(non_ascii_idents)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unit_bindings)]
#![warn(unused_crate_dependencies)]
#![warn(unused_qualifications)]

// Crate dependencies used in binary/test but not in the library. Unfortunately
// cargo does not yet allow specifying dependencies for binaries only.
use console as _;
use humantime as _;
use serde_json as _;
use tracing_subscriber as _;

pub mod algebra;
pub mod approx;
pub mod codegen;
pub mod compiler;
pub mod search;
pub mod sim;
