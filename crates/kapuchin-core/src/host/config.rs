use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::host::class::HostClass;
use crate::host::error::{HostError, HostResult};
use crate::host::printer::{Printer, PrinterObject, CONFIGFILE_OBJECT};

/// Name of the host class whose validation step kapuchin intercepts.
pub const PRINTER_CONFIG_CLASS: &str = "PrinterConfig";
/// Validation method run after every section has been loaded.
pub const CHECK_UNUSED_OPTIONS: &str = "check_unused_options";

#[derive(Debug, Clone)]
struct SectionData {
    name: String,
    options: Vec<(String, String)>,
}

impl SectionData {
    fn set(&mut self, option: String, value: String) {
        match self.options.iter_mut().find(|(name, _)| *name == option) {
            Some(existing) => existing.1 = value,
            None => self.options.push((option, value)),
        }
    }
}

/// A parsed `printer.cfg`: sections in file order, plus the access tracking
/// used by host validation.
pub struct ConfigFile {
    path: Option<PathBuf>,
    sections: Vec<SectionData>,
    accessed: Mutex<HashSet<(String, String)>>,
    acknowledged: Mutex<HashSet<String>>,
}

impl ConfigFile {
    /// Parse config text. Supports `[section]` headers, `key: value` and
    /// `key = value` options, `#`/`;` comments and indented continuation lines.
    pub fn parse(text: &str) -> HostResult<Arc<Self>> {
        Self::parse_with_path(text, None)
    }

    /// Read and parse a config file from disk.
    pub fn read(path: &Path) -> HostResult<Arc<Self>> {
        let text = std::fs::read_to_string(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_with_path(&text, Some(path.to_path_buf()))
    }

    fn parse_with_path(text: &str, path: Option<PathBuf>) -> HostResult<Arc<Self>> {
        let mut sections: Vec<SectionData> = Vec::new();
        let mut current: Option<usize> = None;
        let mut last_option: Option<String> = None;

        for (index, raw_line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = strip_comment(raw_line);
            if line.trim().is_empty() {
                continue;
            }

            let continuation = line.starts_with(char::is_whitespace);
            let trimmed = line.trim();

            if !continuation && trimmed.starts_with('[') {
                let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
                    return Err(HostError::ConfigParse {
                        line: line_no,
                        message: format!("malformed section header '{}'", trimmed),
                    });
                };
                let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
                if name.is_empty() {
                    return Err(HostError::ConfigParse { line: line_no, message: "empty section name".into() });
                }
                // Repeated sections merge into the first occurrence.
                current = match sections.iter().position(|s| s.name == name) {
                    Some(pos) => Some(pos),
                    None => {
                        sections.push(SectionData { name, options: Vec::new() });
                        Some(sections.len() - 1)
                    }
                };
                last_option = None;
                continue;
            }

            let Some(section_idx) = current else {
                return Err(HostError::ConfigParse {
                    line: line_no,
                    message: "option outside of any section".into(),
                });
            };
            let section = &mut sections[section_idx];

            if continuation {
                if let Some(option) = &last_option {
                    if let Some((_, value)) = section.options.iter_mut().find(|(name, _)| name == option) {
                        if !value.is_empty() {
                            value.push('\n');
                        }
                        value.push_str(trimmed);
                        continue;
                    }
                }
            }

            let Some(split_at) = trimmed.find([':', '=']) else {
                return Err(HostError::ConfigParse {
                    line: line_no,
                    message: format!("expected 'option: value', found '{}'", trimmed),
                });
            };
            let option = trimmed[..split_at].trim().to_lowercase();
            let value = trimmed[split_at + 1..].trim().to_string();
            if option.is_empty() {
                return Err(HostError::ConfigParse { line: line_no, message: "empty option name".into() });
            }
            section.set(option.clone(), value);
            last_option = Some(option);
        }

        Ok(Arc::new(Self {
            path,
            sections,
            accessed: Mutex::new(HashSet::new()),
            acknowledged: Mutex::new(HashSet::new()),
        }))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Section names in file order.
    pub fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    /// Handle to one section.
    pub fn section(self: &Arc<Self>, printer: &Arc<Printer>, name: &str) -> HostResult<ConfigSection> {
        if !self.has_section(name) {
            return Err(HostError::MissingSection(name.to_string()));
        }
        Ok(ConfigSection {
            file: self.clone(),
            printer: Arc::downgrade(printer),
            name: name.to_string(),
        })
    }

    /// Handles to every section, in file order.
    pub fn sections(self: &Arc<Self>, printer: &Arc<Printer>) -> Vec<ConfigSection> {
        self.get_prefix_sections(printer, "")
    }

    /// Handles to every section whose name starts with `prefix`, in file order.
    pub fn get_prefix_sections(self: &Arc<Self>, printer: &Arc<Printer>, prefix: &str) -> Vec<ConfigSection> {
        self.sections
            .iter()
            .filter(|s| s.name.starts_with(prefix))
            .map(|s| ConfigSection {
                file: self.clone(),
                printer: Arc::downgrade(printer),
                name: s.name.clone(),
            })
            .collect()
    }

    /// Exempt a section from validation. Used for plugin sections whose
    /// plugin failed to load, so the rest of the host can still start.
    pub fn acknowledge_section(&self, name: &str) {
        self.acknowledged.lock().insert(name.to_string());
    }

    pub fn is_acknowledged(&self, name: &str) -> bool {
        self.acknowledged.lock().contains(name)
    }

    fn raw(&self, section: &str, option: &str) -> Option<String> {
        self.sections
            .iter()
            .find(|s| s.name == section)
            .and_then(|s| s.options.iter().find(|(name, _)| name == option))
            .map(|(_, value)| value.clone())
    }

    fn options_of(&self, section: &str) -> Vec<String> {
        self.sections
            .iter()
            .find(|s| s.name == section)
            .map(|s| s.options.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    fn mark_accessed(&self, section: &str, option: &str) {
        self.accessed.lock().insert((section.to_string(), option.to_string()));
    }

    fn is_accessed(&self, section: &str, option: &str) -> bool {
        self.accessed.lock().contains(&(section.to_string(), option.to_string()))
    }

    /// Host validation: every section needs a registered object or an
    /// accessed option, and every option must have been read.
    pub fn validate(&self, printer: &Printer) -> HostResult<()> {
        for section in &self.sections {
            if self.is_acknowledged(&section.name) {
                continue;
            }
            let any_accessed = section.options.iter().any(|(option, _)| self.is_accessed(&section.name, option));
            if !any_accessed && printer.lookup_object(&section.name).is_none() {
                return Err(HostError::InvalidSection(section.name.clone()));
            }
            for (option, _) in &section.options {
                if !self.is_accessed(&section.name, option) {
                    return Err(HostError::UnusedOption {
                        section: section.name.clone(),
                        option: option.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl PrinterObject for ConfigFile {
    fn status(&self) -> Value {
        let config: Map<String, Value> = self
            .sections
            .iter()
            .map(|s| {
                let options: Map<String, Value> = s
                    .options
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                    .collect();
                (s.name.clone(), Value::Object(options))
            })
            .collect();
        let mut status = Map::new();
        status.insert("config".into(), Value::Object(config));
        Value::Object(status)
    }
}

impl fmt::Debug for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigFile")
            .field("path", &self.path)
            .field("sections", &self.section_names())
            .finish()
    }
}

/// Handle to one section of a [`ConfigFile`], passed to initialization
/// entry points. Every getter records the option as accessed.
#[derive(Clone)]
pub struct ConfigSection {
    file: Arc<ConfigFile>,
    printer: Weak<Printer>,
    name: String,
}

impl ConfigSection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &Arc<ConfigFile> {
        &self.file
    }

    pub fn printer(&self) -> HostResult<Arc<Printer>> {
        self.printer.upgrade().ok_or(HostError::PrinterGone)
    }

    /// Option names present in this section, in file order.
    pub fn options(&self) -> Vec<String> {
        self.file.options_of(&self.name)
    }

    /// Whether the option is present. Does not count as an access.
    pub fn has(&self, option: &str) -> bool {
        self.file.raw(&self.name, &option.to_lowercase()).is_some()
    }

    fn lookup(&self, option: &str) -> Option<String> {
        let option = option.to_lowercase();
        self.file.mark_accessed(&self.name, &option);
        self.file.raw(&self.name, &option)
    }

    pub fn get(&self, option: &str) -> HostResult<String> {
        self.lookup(option).ok_or_else(|| HostError::MissingOption {
            section: self.name.clone(),
            option: option.to_string(),
        })
    }

    pub fn get_or(&self, option: &str, default: &str) -> String {
        self.lookup(option).unwrap_or_else(|| default.to_string())
    }

    pub fn getfloat(&self, option: &str) -> HostResult<f64> {
        let raw = self.get(option)?;
        self.parse_float(option, &raw)
    }

    pub fn getfloat_or(&self, option: &str, default: f64) -> HostResult<f64> {
        match self.lookup(option) {
            Some(raw) => self.parse_float(option, &raw),
            None => Ok(default),
        }
    }

    /// Boolean option accepting `True/False`, `yes/no`, `on/off` and `1/0`.
    pub fn getboolean_or(&self, option: &str, default: bool) -> HostResult<bool> {
        match self.lookup(option) {
            Some(raw) => match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(HostError::invalid_option(&self.name, option, format!("'{}' is not a boolean", other))),
            },
            None => Ok(default),
        }
    }

    fn parse_float(&self, option: &str, raw: &str) -> HostResult<f64> {
        raw.trim()
            .parse::<f64>()
            .map_err(|e| HostError::invalid_option(&self.name, option, e.to_string()))
    }

    /// Sections of the same file whose names start with `prefix`.
    pub fn get_prefix_sections(&self, prefix: &str) -> HostResult<Vec<ConfigSection>> {
        let printer = self.printer()?;
        Ok(self.file.get_prefix_sections(&printer, prefix))
    }
}

impl fmt::Debug for ConfigSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSection").field("name", &self.name).finish()
    }
}

/// The host's `PrinterConfig` class. Its `check_unused_options` validates the
/// config file registered as `configfile` on the instance's printer.
pub fn printer_config_class() -> Arc<HostClass> {
    let class = HostClass::new(PRINTER_CONFIG_CLASS);
    class.define(CHECK_UNUSED_OPTIONS, |this, _args| {
        let printer = this.printer()?;
        let config = printer.require::<ConfigFile>(CONFIGFILE_OBJECT)?;
        config.validate(&printer)?;
        Ok(Value::Null)
    });
    class
}

fn strip_comment(line: &str) -> &str {
    let mut prev_ws = true;
    for (idx, ch) in line.char_indices() {
        if (ch == '#' || ch == ';') && prev_ws {
            return &line[..idx];
        }
        prev_ws = ch.is_whitespace();
    }
    line
}

