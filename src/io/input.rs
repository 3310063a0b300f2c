use crate::defaults::CONFIG_FILE_NAME;
use crate::io::Configuration;
use crate::system::LatticeModel;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read the lattice model and the configuration of a calculation.
pub fn read_input(model_file: &str) -> Result<(LatticeModel, Configuration)> {
    // The model description is the only mandatory file to start a calculation.
    let model_string: String = fs::read_to_string(model_file)
        .with_context(|| format!("unable to read model file {}", model_file))?;
    let model: LatticeModel = toml::from_str(&model_string)
        .with_context(|| format!("unable to parse model file {}", model_file))?;

    // The configuration file is read from the directory of the model file. If it does not
    // exist the default settings are used and written to that directory, so that the
    // user can see all the used options.
    let directory: &Path = Path::new(model_file)
        .parent()
        .unwrap_or_else(|| Path::new(""));
    let config_file_path = directory.join(CONFIG_FILE_NAME);
    let config: Configuration = read_config(&config_file_path)?;
    Ok((model, config))
}

/// Load the configuration file, write the defaults if it does not exist yet.
pub fn read_config(config_file_path: &Path) -> Result<Configuration> {
    let exists: bool = config_file_path.exists();
    let config_string: String = if exists {
        fs::read_to_string(config_file_path).with_context(|| {
            format!("unable to read config file {}", config_file_path.display())
        })?
    } else {
        String::new()
    };
    let config: Configuration = toml::from_str(&config_string).with_context(|| {
        format!("unable to parse config file {}", config_file_path.display())
    })?;
    if !exists {
        let config_string: String =
            toml::to_string(&config).context("unable to serialize the configuration")?;
        fs::write(config_file_path, config_string).with_context(|| {
            format!("unable to write config file {}", config_file_path.display())
        })?;
    }
    Ok(config)
}
