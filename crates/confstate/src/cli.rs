use clap::Subcommand;

use confstate_core::kernel::error::{Error, Result};
use confstate_core::storage::{ConfigData, SaveOutcome, StateStorageManager, StorageSpec};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Expand a spec into an absolute path
    Expand {
        spec: String,
    },
    /// Collapse an absolute path into macro form
    Collapse {
        path: String,
    },
    /// Print the state of a component, or one key of it
    Get {
        spec: String,
        component: String,
        key: Option<String>,
        /// Custom storage class to use instead of a file
        #[arg(long)]
        class: Option<String>,
    },
    /// Set one key of a component's state and save
    Set {
        spec: String,
        component: String,
        key: String,
        /// JSON value; anything that does not parse is stored as a string
        value: String,
        #[arg(long)]
        class: Option<String>,
    },
    /// List the components stored in a spec
    Components {
        spec: String,
        #[arg(long)]
        class: Option<String>,
    },
    /// List registered custom storage classes
    Classes,
}

fn storage_spec(spec: &str, class: Option<String>) -> StorageSpec {
    let request = StorageSpec::new(spec);
    match class {
        Some(class) => request.custom_class(class),
        None => request,
    }
}

fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn rendered(json: serde_json::Result<String>) -> Result<String> {
    json.map_err(|e| Error::Other(format!("Cannot render value: {}", e)))
}

/// Run one command against `manager`, printing results to stdout
pub fn execute(manager: &StateStorageManager, command: Command) -> Result<()> {
    match command {
        Command::Expand { spec } => {
            println!("{}", manager.expand_macro(&spec)?.display());
        }
        Command::Collapse { path } => {
            println!("{}", manager.collapse_macro(&path));
        }
        Command::Get { spec, component, key, class } => {
            let storage = manager.get_or_create_storage(&storage_spec(&spec, class))?;
            let state = storage
                .get_state(&component)?
                .ok_or_else(|| Error::Other(format!("No state for component '{}' in '{}'", component, spec)))?;
            match key {
                Some(key) => {
                    let value = state
                        .get_raw(&key)
                        .ok_or_else(|| Error::Other(format!("No key '{}' in component '{}'", key, component)))?;
                    println!("{}", rendered(serde_json::to_string_pretty(value))?);
                }
                None => println!("{}", rendered(serde_json::to_string_pretty(&state))?),
            }
        }
        Command::Set { spec, component, key, value, class } => {
            let storage = manager.get_or_create_storage(&storage_spec(&spec, class))?;
            let mut state = storage.get_state(&component)?.unwrap_or_else(ConfigData::new);
            state.set(&key, parse_value(&value))?;
            storage.set_state(&component, state)?;
            match storage.save()? {
                SaveOutcome::Unchanged => println!("unchanged"),
                outcome => println!("saved ({:?})", outcome),
            }
        }
        Command::Components { spec, class } => {
            let storage = manager.get_or_create_storage(&storage_spec(&spec, class))?;
            for name in storage.component_names()? {
                println!("{}", name);
            }
        }
        Command::Classes => {
            for class in manager.custom_storage_classes() {
                println!("{}", class);
            }
        }
    }
    Ok(())
}
