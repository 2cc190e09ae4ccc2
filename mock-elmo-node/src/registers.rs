//! Register table of the simulated controller.
//!
//! Holds the last value written with each set-style command, keyed by mnemonic and
//! array index, plus the static values the node starts with.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use elmo_pdo::command::{self, CommandSpec};
use elmo_pdo::Argument;
use serde::Deserialize;
use tracing::info;

/// Initial values of the simulated node, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeProfile {
    pub max_current: f32,
    pub speed: i32,
    pub position: i32,
    pub velocity_limit: i32,
    pub feedback_limit: i32,
}

impl Default for NodeProfile {
    fn default() -> Self {
        Self {
            max_current: 10.0,
            speed: 10000,
            position: 0,
            velocity_limit: 320000,
            feedback_limit: 320000,
        }
    }
}

impl NodeProfile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

type Key = ([u8; 2], u8);

fn key(spec: &CommandSpec) -> Key {
    (spec.mnemonic, spec.index)
}

/// Register values by command.
pub struct RegisterTable {
    entries: HashMap<Key, Argument>,
}

impl RegisterTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn from_profile(profile: &NodeProfile) -> Self {
        let mut table = Self::new();
        table.set(&command::MAX_CURRENT, Argument::Float(profile.max_current));
        table.set(&command::SPEED, Argument::Int(profile.speed));
        table.set(&command::MOTOR_ON, Argument::Int(0));
        table.set(&command::UNIT_MODE, Argument::Int(elmo_pdo::UnitMode::Position.code()));
        table.set(&command::VELOCITY_LOW, Argument::Int(-profile.velocity_limit));
        table.set(&command::VELOCITY_HIGH, Argument::Int(profile.velocity_limit));
        table.set(&command::FEEDBACK_LOW, Argument::Int(-profile.feedback_limit));
        table.set(&command::FEEDBACK_HIGH, Argument::Int(profile.feedback_limit));
        table
    }

    pub fn set(&mut self, spec: &CommandSpec, value: Argument) {
        self.entries.insert(key(spec), value);
    }

    pub fn get(&self, spec: &CommandSpec) -> Option<Argument> {
        self.entries.get(&key(spec)).copied()
    }

    pub fn get_int(&self, spec: &CommandSpec) -> Option<i32> {
        match self.get(spec) {
            Some(Argument::Int(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_float(&self, spec: &CommandSpec) -> Option<f32> {
        match self.get(spec) {
            Some(Argument::Float(v)) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Logs every register, sorted by mnemonic.
    pub fn log_summary(&self) {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();

        for k in keys {
            let name = CommandSpec::lookup(k.0, k.1).map(|s| s.name).unwrap_or("??");
            info!("  {:<6} = {:?}", name, self.entries[k]);
        }
    }
}
