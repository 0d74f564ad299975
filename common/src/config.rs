use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Helper trait for dispatching fs ops for different config files
pub trait ConfigManager: Sized {
    fn directory(&self) -> PathBuf;

    fn filename(&self) -> PathBuf;

    fn path(&self) -> PathBuf {
        self.directory().join(self.filename())
    }

    fn exists(&self) -> bool {
        self.path().exists()
    }

    fn create<C>(&self) -> Result<()>
    where
        C: Serialize + Default,
    {
        if self.exists() {
            return Ok(());
        }
        let config = C::default();
        self.save(&config)
    }

    fn open<C>(&self) -> Result<C>
    where
        C: for<'de> Deserialize<'de>,
    {
        let path = self.path();
        let config_string = File::open(&path)
            .and_then(|mut f| {
                let mut buf = String::new();
                f.read_to_string(&mut buf)?;
                Ok(buf)
            })
            .with_context(|| anyhow!("Unable to read configuration file: {}", path.display()))?;
        toml::from_str(config_string.as_str())
            .with_context(|| anyhow!("Invalid configuration file: {}", path.display()))
    }

    fn save<C>(&self, config: &C) -> Result<()>
    where
        C: Serialize,
    {
        let path = self.path();
        std::fs::create_dir_all(self.directory())?;

        let mut config_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let config_str = toml::to_string_pretty(config)?;
        config_file
            .write_all(config_str.as_bytes())
            .with_context(|| {
                anyhow!(
                    "Could not write the configuration file: {}",
                    path.display()
                )
            })?;
        Ok(())
    }
}

/// Config files living under the user's config directory, eg. `~/.config/wedeploy/config.toml`
pub struct GlobalConfigManager {
    directory: PathBuf,
    filename: PathBuf,
}

impl GlobalConfigManager {
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            anyhow!(
                "Could not find a configuration directory. Your operating system may not be supported."
            )
        })?;

        Ok(Self::with_directory(config_dir.join(app_name)))
    }

    /// Use an explicit directory instead of the platform config directory
    pub fn with_directory(directory: PathBuf) -> Self {
        Self {
            directory,
            filename: PathBuf::from("config.toml"),
        }
    }

    /// Another file in the same directory, eg. the usage metrics log
    pub fn sibling(&self, filename: &str) -> PathBuf {
        self.directory.join(filename)
    }
}

impl ConfigManager for GlobalConfigManager {
    fn directory(&self) -> PathBuf {
        self.directory.clone()
    }

    fn filename(&self) -> PathBuf {
        self.filename.clone()
    }
}
