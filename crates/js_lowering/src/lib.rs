//! Module syntax support for packlet, built on the oxc parser.
//!
//! [`lower_module`] parses an ES module, rejects invalid syntax, and rewrites
//! its `import` and `export` statements into code that runs with two injected
//! bindings, `require` and `exports`. [`Downleveler`] optionally lowers newer
//! syntax to an older ECMAScript target first.

mod downlevel;
mod error;
mod lowering;
mod utils;

pub use crate::downlevel::{Downleveler, TargetError};
pub use crate::error::{SyntaxError, line_column};
pub use crate::lowering::{LoweredModule, lower_module};
pub use crate::utils::{is_identifier_name, member, quote};
