//! Model Configuration Module
//!
//! Architecture settings for the backbone+head classifier. Saved next to the
//! trained weights as `model_config.json` so the serving side can rebuild the
//! exact module tree before loading the record.

use std::path::Path;

use burn::config::Config;

use crate::utils::error::JaundiceError;

/// Configuration for the jaundice classifier
#[derive(Config, Debug, PartialEq)]
pub struct ClassifierConfig {
    /// Input image size (assumes square images)
    #[config(default = "224")]
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Output filters of each backbone stage
    #[config(default = "vec![16, 32, 64, 128, 256]")]
    pub stage_filters: Vec<usize>,

    /// Units of the first head layer
    #[config(default = "256")]
    pub head_units: usize,

    /// Units of the second head layer
    #[config(default = "128")]
    pub head_units_2: usize,

    /// Dropout after the first head layer
    #[config(default = "0.5")]
    pub dropout_1: f64,

    /// Dropout after the second head layer
    #[config(default = "0.3")]
    pub dropout_2: f64,
}

impl ClassifierConfig {
    /// Number of backbone stages
    pub fn depth(&self) -> usize {
        self.stage_filters.len()
    }

    /// Input shape as [channels, height, width]
    pub fn input_shape(&self) -> [usize; 3] {
        [self.in_channels, self.input_size, self.input_size]
    }

    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.stage_filters.is_empty() {
            return Err(JaundiceError::Config("stage_filters must not be empty".to_string()));
        }
        if self.input_size == 0 || self.in_channels == 0 {
            return Err(JaundiceError::Config(
                "input_size and in_channels must be positive".to_string(),
            ));
        }
        if self.input_size >> self.depth() == 0 {
            return Err(JaundiceError::Config(format!(
                "input_size {} is too small for {} pooling stages",
                self.input_size,
                self.depth()
            )));
        }
        for dropout in [self.dropout_1, self.dropout_2] {
            if !(0.0..1.0).contains(&dropout) {
                return Err(JaundiceError::Config(format!(
                    "dropout must be in [0, 1), got {}",
                    dropout
                )));
            }
        }
        Ok(())
    }

    /// Write as pretty JSON
    pub fn save_json(&self, path: &Path) -> crate::utils::error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> crate::utils::error::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
