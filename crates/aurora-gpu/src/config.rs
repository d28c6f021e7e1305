//! Context configuration.
//!
//! All negotiation inputs and pool capacities are fixed at initialization
//! time and carried in an explicit struct rather than process-wide state,
//! so multiple contexts can coexist in tests.

use crate::instance::{required_device_extensions, required_instance_extensions, validation_layers};
use std::ffi::CStr;

/// Configuration for creating a [`crate::GpuContext`].
#[derive(Clone)]
pub struct ContextConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Engine name reported to the driver.
    pub engine_name: String,
    /// Enable validation layers (default: debug builds only).
    pub validation: bool,
    /// Mandatory instance extensions; absence aborts startup. Platform
    /// surface extensions are probed separately and need only one match.
    pub instance_extensions: Vec<&'static CStr>,
    /// Mandatory device extensions; candidates lacking any are discarded.
    pub device_extensions: Vec<&'static CStr>,
    /// Mandatory validation layers when `validation` is set.
    pub validation_layers: Vec<&'static CStr>,
    /// Descriptor pool capacity for combined image samplers.
    pub max_combined_image_samplers: u32,
    /// Descriptor pool capacity for uniform buffers.
    pub max_uniform_buffers: u32,
    /// Descriptor pool capacity for descriptor sets. The pool never grows;
    /// exhaustion is a hard allocation failure.
    pub max_descriptor_sets: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            app_name: "Aurora".to_string(),
            engine_name: "Aurora".to_string(),
            validation: cfg!(debug_assertions),
            instance_extensions: required_instance_extensions(),
            device_extensions: required_device_extensions(),
            validation_layers: validation_layers(),
            max_combined_image_samplers: 32,
            max_uniform_buffers: 32,
            max_descriptor_sets: 512,
        }
    }
}

impl ContextConfig {
    /// Create a config with the given application name.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Set the engine name.
    pub fn with_engine_name(mut self, name: impl Into<String>) -> Self {
        self.engine_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Override descriptor pool capacities.
    pub fn with_descriptor_capacity(mut self, samplers: u32, uniforms: u32, sets: u32) -> Self {
        self.max_combined_image_samplers = samplers;
        self.max_uniform_buffers = uniforms;
        self.max_descriptor_sets = sets;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_capacities() {
        let config = ContextConfig::default();
        assert_eq!(config.max_combined_image_samplers, 32);
        assert_eq!(config.max_uniform_buffers, 32);
        assert_eq!(config.max_descriptor_sets, 512);
    }

    #[test]
    fn mandatory_lists_are_not_empty() {
        let config = ContextConfig::new("test");
        assert!(!config.instance_extensions.is_empty());
        assert!(!config.device_extensions.is_empty());
        assert!(!config.validation_layers.is_empty());
    }
}
