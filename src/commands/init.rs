use anyhow::Result;
use std::path::Path;

use crate::config::{CONFIG_FILE_NAME, CONFIG_TEMPLATE};

/// Write the configuration template into `dir`.
pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, CONFIG_TEMPLATE)?;
    println!("Created {} configuration file", config_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_path;

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), false).unwrap();
        assert!(init_config(dir.path(), false).is_err());
        init_config(dir.path(), true).unwrap();

        let config = load_config_from_path(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config.tunables.lookback_days, 90);
    }
}
