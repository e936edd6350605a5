//! Service listing, config bootstrap and tool checks.

use std::path::Path;

use super::download::load_config;
use crate::config::{self, Config};
use crate::convert::FfmpegTranscoder;
use crate::service::ServiceRegistry;

/// List the services built from the config
pub fn cmd_services(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let services = ServiceRegistry::from_config(&config);

    let mut count = 0;
    for name in services.names() {
        let service = services.get(name)?;
        println!("{name}: {:?}", service.capabilities());
        count += 1;
    }
    if count == 0 {
        println!("No services configured.");
        println!("Add catalogs to the [catalogs] section of the config file.");
    }
    Ok(())
}

/// Write the default config
pub fn cmd_init_config(config_path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists, use --force to overwrite", path.display());
    }

    config::save_to(&Config::default(), &path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

/// Check if ffmpeg is installed
pub fn cmd_check_tools() -> anyhow::Result<()> {
    println!("Checking conversion tools...\n");

    if FfmpegTranscoder::new().is_available() {
        println!("✓ ffmpeg is installed");
    } else {
        println!("✗ ffmpeg is NOT installed");
        println!("  Codec conversions will be skipped and original files kept.");
        println!("  Install from https://ffmpeg.org/download.html");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        cmd_init_config(Some(&path), false).unwrap();
        assert!(path.exists());
        assert!(cmd_init_config(Some(&path), false).is_err());
        cmd_init_config(Some(&path), true).unwrap();

        let loaded = config::load_from(&path).unwrap();
        assert_eq!(loaded.general.download_quality, "hifi");
    }
}
