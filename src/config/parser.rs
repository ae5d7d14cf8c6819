use crate::config::types::Config;
use crate::config::validation::validate;
use crate::{ConfigError, ConfigResult};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads, parses and validates a harvest configuration file
///
/// The file must define the `[pipeline]`, `[seed]`, `[site]` and `[output]`
/// tables; `[politeness]` is optional. Errors carry the file path, and
/// validation errors name the offending table.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use gallery_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Workers: {}", config.pipeline.workers);
/// ```
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = read_config_file(path)?;
    parse_config(&content, path)
}

/// Hex-encoded SHA-256 of the configuration file
///
/// Logged at startup so a run can be matched to the exact configuration it used.
pub fn compute_config_hash(path: &Path) -> ConfigResult<String> {
    Ok(hash_content(&read_config_file(path)?))
}

/// Loads a configuration together with the hash of the bytes it was parsed from
///
/// The file is read once, so the hash always describes the loaded config
/// even if the file changes on disk meanwhile.
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(Config, String)> {
    let content = read_config_file(path)?;
    let config = parse_config(&content, path)?;
    Ok((config, hash_content(&content)))
}

fn read_config_file(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn parse_config(content: &str, path: &Path) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    validate(&config)?;
    Ok(config)
}

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
