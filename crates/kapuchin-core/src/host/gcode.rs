use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::host::error::{HostError, HostResult};
use crate::host::instance::Instance;
use crate::host::printer::PrinterObject;

pub type CommandHandler = Arc<dyn Fn(&GCodeCommand<'_>) -> HostResult<()> + Send + Sync>;

#[derive(Clone)]
struct RegisteredCommand {
    handler: CommandHandler,
    desc: Option<String>,
}

/// One parsed G-code line, handed to a command handler.
pub struct GCodeCommand<'a> {
    command: String,
    params: HashMap<String, String>,
    dispatcher: &'a GCodeDispatcher,
}

impl GCodeCommand<'_> {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(&name.to_uppercase()).map(String::as_str)
    }

    /// Optional float parameter; present but unparsable is an error.
    pub fn get_float(&self, name: &str) -> HostResult<Option<f64>> {
        match self.get(name) {
            Some(raw) => raw
                .parse::<f64>()
                .map(Some)
                .map_err(|_| HostError::command(format!("Unable to parse '{}' as a float", raw))),
            None => Ok(None),
        }
    }

    pub fn respond_info(&self, message: &str) {
        self.dispatcher.respond_info(message);
    }

    /// Parameters as a JSON object, for passing to host methods.
    pub fn params_value(&self) -> Value {
        let params: Map<String, Value> = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(params)
    }
}

/// The host's G-code command table.
#[derive(Default)]
pub struct GCodeDispatcher {
    commands: RwLock<BTreeMap<String, RegisteredCommand>>,
    responses: Mutex<Vec<String>>,
}

impl GCodeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_command<F>(&self, name: &str, desc: Option<&str>, handler: F) -> HostResult<()>
    where
        F: Fn(&GCodeCommand<'_>) -> HostResult<()> + Send + Sync + 'static,
    {
        let name = name.to_uppercase();
        let mut commands = self.commands.write();
        if commands.contains_key(&name) {
            return Err(HostError::DuplicateCommand(name));
        }
        log::debug!("Registered G-code command {}", name);
        commands.insert(
            name,
            RegisteredCommand {
                handler: Arc::new(handler),
                desc: desc.map(str::to_string),
            },
        );
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        let commands = self.commands.read();
        commands.contains_key(&name.to_uppercase())
    }

    /// Help text of a registered command.
    pub fn description(&self, name: &str) -> Option<String> {
        let commands = self.commands.read();
        commands.get(&name.to_uppercase()).and_then(|c| c.desc.clone())
    }

    /// Parse and run one line such as `SET_VELOCITY_LIMIT VELOCITY=200`.
    pub fn run_script_line(&self, line: &str) -> HostResult<()> {
        let line = line.split(';').next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(());
        }
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_uppercase();
        let mut params = HashMap::new();
        for word in words {
            match word.split_once('=') {
                Some((key, value)) => params.insert(key.to_uppercase(), value.to_string()),
                // Classic G-code style: S255, P0.5
                None => {
                    let (key, value) = word.split_at(word.chars().next().map_or(0, char::len_utf8));
                    params.insert(key.to_uppercase(), value.to_string())
                }
            };
        }

        let handler = {
            let commands = self.commands.read();
            commands
                .get(&command)
                .map(|c| c.handler.clone())
                .ok_or_else(|| HostError::UnknownCommand(command.clone()))?
        };
        let gcmd = GCodeCommand { command, params, dispatcher: self };
        handler(&gcmd)
    }

    pub fn respond_info(&self, message: &str) {
        log::info!("{}", message);
        self.responses.lock().push(message.to_string());
    }


    /// Drain every response collected so far.
    pub fn take_responses(&self) -> Vec<String> {
        std::mem::take(&mut *self.responses.lock())
    }

    pub fn command_names(&self) -> Vec<String> {
        let commands = self.commands.read();
        commands.keys().cloned().collect()
    }
}

impl PrinterObject for GCodeDispatcher {
    fn status(&self) -> Value {
        let mut status = Map::new();
        status.insert(
            "commands".into(),
            Value::Array(self.command_names().into_iter().map(Value::String).collect()),
        );
        Value::Object(status)
    }
}

impl fmt::Debug for GCodeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GCodeDispatcher").field("commands", &self.command_names()).finish()
    }
}

/// Handler forwarding a command to `method` on `instance`, looked up through
/// the live method table on every call. A string result is sent back with
/// `respond_info`.
pub fn method_handler(
    instance: &Instance,
    method: &str,
) -> HostResult<impl Fn(&GCodeCommand<'_>) -> HostResult<()> + Send + Sync + 'static> {
    let handle = instance.handle()?;
    let method = method.to_string();
    Ok(move |gcmd: &GCodeCommand<'_>| {
        let response = handle.call(&method, &[gcmd.params_value()])?;
        if let Some(message) = response.as_str() {
            gcmd.respond_info(message);
        }
        Ok(())
    })
}
