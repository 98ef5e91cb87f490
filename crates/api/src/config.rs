//! Types for use when configuring supernode modules.

use crate::*;

/// helper transcode function
fn tc<S: serde::Serialize, D: serde::de::DeserializeOwned>(
    s: &S,
) -> SnResult<D> {
    serde_json::from_str(
        &serde_json::to_string(s)
            .map_err(|e| SnError::other_src("encode", e))?,
    )
    .map_err(|e| SnError::other_src("decode", e))
}

/// Denotes a type used to configure a specific supernode module.
///
/// A module config is a wrapper struct with a single camelCase field
/// named after the module, e.g. `{ "coreReaper": { ... } }`. The field
/// name is the key under which the module's settings live in [Config].
pub trait ModConfig:
    'static
    + Sized
    + Default
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
{
}

impl<T> ModConfig for T where
    T: 'static
        + Sized
        + Default
        + std::fmt::Debug
        + serde::Serialize
        + serde::de::DeserializeOwned
        + Send
        + Sync
{
}

/// Supernode configuration.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Config(serde_json::Map<String, serde_json::Value>);

impl Config {
    /// Factories call this with their default module config while a
    /// default configuration is being generated. Refuses to overwrite
    /// a module key that was already set.
    pub fn set_module_config<M: ModConfig>(&mut self, m: &M) -> SnResult<()> {
        let map: serde_json::Map<String, serde_json::Value> = tc(m)?;
        for (k, v) in map {
            if self.0.contains_key(&k) {
                return Err(SnError::other(format!(
                    "Refusing to overwrite conflicting module name: {k}"
                )));
            }
            self.0.insert(k, v);
        }
        Ok(())
    }

    /// Extract a module config. Modules that are not present in the
    /// config, and properties missing from a present module, fall back
    /// to defaults. Unknown properties are ignored.
    pub fn get_module_config<M: ModConfig>(&self) -> SnResult<M> {
        tc(&self.0)
    }
}
