//! # Template Registry
//!
//! Holds every command template, parsed once from configuration.
//!
//! Lookup order for `resolve(class, name)`:
//!
//! 1. templates specific to the device class (`[templates.gamepad]` etc.)
//! 2. class independent verbs (`[templates.verbs]`)
//!
//! The registry never formats numbers; it only hands out templates and
//! their arity.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::template::CommandTemplate;
use crate::config::TemplateConfig;
use crate::controller::device::DeviceClass;
use crate::error::{BridgeError, Result};

/// Parsed templates keyed by device class and command name.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    by_class: HashMap<DeviceClass, BTreeMap<String, CommandTemplate>>,
    verbs: BTreeMap<String, CommandTemplate>,
}

fn parse_table(table: &BTreeMap<String, String>) -> Result<BTreeMap<String, CommandTemplate>> {
    table
        .iter()
        .map(|(name, source)| Ok((name.clone(), CommandTemplate::parse(source)?)))
        .collect()
}

impl TemplateRegistry {
    /// Builds the registry from the `[templates]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `TemplateParse` for the first template that does not parse.
    pub fn from_config(config: &TemplateConfig) -> Result<Self> {
        let mut by_class = HashMap::new();
        for class in DeviceClass::ALL {
            by_class.insert(class, parse_table(config.for_class(class))?);
        }
        let verbs = parse_table(&config.verbs)?;

        debug!(
            "Loaded {} class templates and {} verbs",
            by_class.values().map(BTreeMap::len).sum::<usize>(),
            verbs.len()
        );

        Ok(Self { by_class, verbs })
    }

    /// Finds the template for a device class and command name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTemplate` when neither the class table nor the verb
    /// table has an entry for `name`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lisu_bridge::command::registry::TemplateRegistry;
    /// use lisu_bridge::config::TemplateConfig;
    /// use lisu_bridge::controller::device::DeviceClass;
    ///
    /// let registry = TemplateRegistry::from_config(&TemplateConfig::default())?;
    /// let template = registry.resolve(DeviceClass::Gamepad, "move")?;
    /// assert_eq!(template.arity(), 3);
    /// # Ok::<(), lisu_bridge::error::BridgeError>(())
    /// ```
    pub fn resolve(&self, class: DeviceClass, name: &str) -> Result<&CommandTemplate> {
        self.by_class
            .get(&class)
            .and_then(|table| table.get(name))
            .or_else(|| self.verbs.get(name))
            .ok_or_else(|| BridgeError::UnknownTemplate {
                class,
                name: name.to_string(),
            })
    }

    /// Class independent verb template, if registered.
    #[must_use]
    pub fn verb(&self, name: &str) -> Option<&CommandTemplate> {
        self.verbs.get(name)
    }

    /// Names resolvable for `class`: class-specific entries first, then verbs.
    #[must_use]
    pub fn command_names(&self, class: DeviceClass) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_class
            .get(&class)
            .map(|table| table.keys().map(String::as_str).collect())
            .unwrap_or_default();
        for verb in self.verbs.keys() {
            if !names.contains(&verb.as_str()) {
                names.push(verb);
            }
        }
        names
    }

    /// Verb names in alphabetical order.
    pub fn verb_names(&self) -> impl Iterator<Item = &str> {
        self.verbs.keys().map(String::as_str)
    }
}
