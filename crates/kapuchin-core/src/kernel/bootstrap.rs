use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::extras;
use crate::host::config::ConfigFile;
use crate::host::printer::Printer;
use crate::host::stock;
use crate::kernel::constants;
use crate::kernel::error::{Error, Result};

/// A stock host with kapuchin available: the `ToolHead` and `Fan`
/// components plus the `[kapuchin]` extra.
pub struct Application {
    printer: Arc<Printer>,
    started: bool,
}

impl Application {
    pub fn new() -> Self {
        log::info!("Initializing {} v{}", constants::APP_NAME, constants::APP_VERSION);
        let printer = Printer::new();
        stock::install(&printer);
        extras::register(&printer);
        Self { printer, started: false }
    }

    pub fn printer(&self) -> &Arc<Printer> {
        &self.printer
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Run the host's startup sequence against `config`. A printer starts
    /// once; a second call fails.
    pub fn start(&mut self, config: Arc<ConfigFile>) -> Result<()> {
        if self.started {
            return Err(Error::from("Application already started"));
        }
        self.printer.startup(config)?;
        self.started = true;
        log::info!("Host started with objects: {:?}", self.printer.object_names());
        Ok(())
    }

    pub fn start_from_path(&mut self, path: &Path) -> Result<()> {
        let config = ConfigFile::read(path)?;
        self.start(config)
    }

    /// Run one G-code line and return the responses it produced.
    pub fn run_gcode(&self, line: &str) -> Result<Vec<String>> {
        let gcode = self.printer.gcode()?;
        gcode.run_script_line(line)?;
        Ok(gcode.take_responses())
    }

    /// Status of every printer object.
    pub fn status(&self) -> Map<String, Value> {
        self.printer.status()
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}
