//! # Kapuchin Host Model
//!
//! The boundary between kapuchin and the printer host it patches. The host is
//! modelled as an explicit dispatch-table object model:
//!
//! - **[`class`]**: [`HostClass`], a named type with a live method table, and
//!   [`Method`], the callable stored in it.
//! - **[`instance`]**: [`Instance`], an object whose calls always resolve
//!   through its class's current table.
//! - **[`printer`]**: [`Printer`], the host process: named objects, classes,
//!   extras, the module-import cache and the startup sequence.
//! - **[`config`]**: `printer.cfg` parsing, [`ConfigSection`] handles and the
//!   `PrinterConfig` validation class.
//! - **[`gcode`]**: the G-code command table.
//! - **[`stock`]**: stock `ToolHead` and `Fan` components.
//!
//! Replacing an entry in a [`HostClass`] table is all a patch ever does.
pub mod class;
pub mod config;
pub mod error;
pub mod gcode;
pub mod instance;
pub mod printer;
pub mod stock;

pub use class::{ClassId, HostClass, Method, MethodFn, CONSTRUCTOR};
pub use config::{ConfigFile, ConfigSection};
pub use error::{HostError, HostResult};
pub use gcode::{GCodeCommand, GCodeDispatcher};
pub use instance::Instance;
pub use printer::{ExtraInit, Printer, PrinterObject};
pub use serde_json::Value;
