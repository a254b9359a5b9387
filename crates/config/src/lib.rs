#![forbid(unsafe_code)]

mod error;
mod ports;
mod scan;
mod termination;

pub use error::Error;
pub use ports::{DEFAULT_DEV_PORTS, DEFAULT_PROTECTED_PORTS, Ports};
pub use scan::Scan;
pub use termination::Termination;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Safe dev servers are terminated without asking when set. Processes
    /// that need confirmation are still always prompted for.
    pub auto_confirm_safe_actions: bool,
    pub ports: Ports,
    pub scan: Scan,
    pub termination: Termination,
}

impl Config {
    /// Load configuration from a TOML file. Missing fields are filled with defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Config = toml_edit::de::from_str(&text)?;
        config.apply_defaults();
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render the configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String, Error> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }

    /// Load configuration from multiple TOML files. Later files override earlier ones.
    pub fn load_multiple<T, U>(paths: U) -> Result<Self, Error>
    where
        T: AsRef<Path>,
        U: IntoIterator<Item = T>,
    {
        let mut merged = toml_edit::DocumentMut::new();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }
            let text = std::fs::read_to_string(path)?;
            let doc: toml_edit::DocumentMut = text.parse()?;
            merge_document(&mut merged, doc);
        }
        let mut config: Config = toml_edit::de::from_str(&merged.to_string())?;
        config.apply_defaults();
        Ok(config)
    }

    /// Whether listeners on `port` must never be touched.
    pub fn is_port_protected(&self, port: u16) -> bool {
        self.ports.is_protected(port)
    }

    fn apply_defaults(&mut self) {
        let defaults = Termination::default();
        let termination = &mut self.termination;
        // A zero poll interval would spin; a cap below the base would shrink
        // every window to less than the single-process fallback gets.
        if termination.poll_interval.is_zero() {
            termination.poll_interval = defaults.poll_interval;
        }
        termination.grace_cap = termination.grace_cap.max(termination.grace_period);

        if self.scan.max_workers == Some(0) {
            self.scan.max_workers = None;
        }
        if self.scan.scan_timeout.is_zero() {
            self.scan.scan_timeout = Duration::from_secs(30);
        }
    }
}

fn merge_document(target: &mut toml_edit::DocumentMut, source: toml_edit::DocumentMut) {
    for (key, item) in source.iter() {
        merge_item(
            target.entry(key).or_insert(toml_edit::Item::None),
            item.clone(),
        );
    }
}

fn merge_item(target: &mut toml_edit::Item, source: toml_edit::Item) {
    use toml_edit::Item;
    match (target, source) {
        (Item::Table(target_table), Item::Table(source_table)) => {
            for (key, item) in source_table.iter() {
                merge_item(target_table.entry(key).or_insert(Item::None), item.clone());
            }
        }
        (Item::ArrayOfTables(target_array), Item::ArrayOfTables(source_array)) => {
            for table in source_array.iter() {
                target_array.push(table.clone());
            }
        }
        (target_item, source_item) => {
            *target_item = source_item;
        }
    }
}
