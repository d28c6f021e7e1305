//! Application configuration.

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title, also used as the Vulkan application name.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Number of frames in flight.
    pub frames_in_flight: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Aurora Engine".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            validation: cfg!(debug_assertions),
            frames_in_flight: 3,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_triple_buffering() {
        let config = AppConfig::default();
        assert_eq!(config.frames_in_flight, 3);
        assert!(config.vsync);
    }

    #[test]
    fn frames_in_flight_never_drops_to_zero() {
        let config = AppConfig::new("test").with_frames_in_flight(0);
        assert_eq!(config.frames_in_flight, 1);
    }
}
