//! Configuration system

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        Self::from_str_with_format(&contents, path)
    }

    /// Parse configuration text, picking the format from the file name
    fn from_str_with_format(contents: &str, path: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Load configuration from file, falling back to defaults when it is absent
    fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        match Self::load_from_file(path) {
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Serialize configuration, picking the format from the file name
    fn to_string_with_format(&self, path: &str) -> Result<String, ConfigError> {
        if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = self.to_string_with_format(path)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Which presentation behaviour the swapchain should favour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    /// Immediate, then mailbox, then FIFO
    LowLatency,
    /// Strict FIFO
    Vsync,
}

impl PresentModePreference {
    /// The other preference
    pub fn toggled(self) -> Self {
        match self {
            Self::LowLatency => Self::Vsync,
            Self::Vsync => Self::LowLatency,
        }
    }
}

/// Renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the driver and shown in the title
    pub application_name: String,
    /// Enable the Khronos validation layer (debug builds only)
    pub enable_validation: bool,
    /// Preferred present mode
    pub present_mode: PresentModePreference,
    /// Swapchain images requested beyond the surface minimum
    pub extra_swapchain_images: u32,
    /// Clear colour of the colour attachment (RGBA)
    pub clear_color: [f32; 4],
    /// Timeout for image acquisition in milliseconds, unbounded when absent
    pub acquire_timeout_ms: Option<u64>,
    /// Spin rate of animated render items in radians per second
    pub spin_rate: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Vulkan Application".to_string(),
            enable_validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::LowLatency,
            extra_swapchain_images: 1,
            clear_color: [1.0, 0.0, 0.0, 1.0],
            acquire_timeout_ms: None,
            spin_rate: 2.0,
        }
    }
}

impl RendererConfig {
    /// Acquire timeout in the unit `vkAcquireNextImageKHR` expects
    pub fn acquire_timeout_ns(&self) -> u64 {
        self.acquire_timeout_ms
            .map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000))
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = RendererConfig::from_str_with_format(
            "application_name = \"Spin\"\npresent_mode = \"vsync\"\n",
            "renderer.toml",
        )
        .unwrap();

        assert_eq!(config.application_name, "Spin");
        assert_eq!(config.present_mode, PresentModePreference::Vsync);
        assert_eq!(config.extra_swapchain_images, 1);
        assert_eq!(config.acquire_timeout_ns(), u64::MAX);
    }

    #[test]
    fn ron_and_toml_agree() {
        let config = RendererConfig {
            spin_rate: 0.5,
            clear_color: [0.1, 0.2, 0.3, 1.0],
            acquire_timeout_ms: Some(250),
            ..RendererConfig::default()
        };

        let toml_text = config.to_string_with_format("a.toml").unwrap();
        let ron_text = config.to_string_with_format("a.ron").unwrap();

        assert_eq!(RendererConfig::from_str_with_format(&toml_text, "a.toml").unwrap(), config);
        assert_eq!(RendererConfig::from_str_with_format(&ron_text, "a.ron").unwrap(), config);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = RendererConfig::from_str_with_format("", "renderer.json").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn toggling_present_mode_flips_back_and_forth() {
        let mode = PresentModePreference::LowLatency;
        assert_eq!(mode.toggled(), PresentModePreference::Vsync);
        assert_eq!(mode.toggled().toggled(), mode);
    }
}
