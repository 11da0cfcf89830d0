//! Configuration management for cryptmirror

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the mount passphrase
pub const PASSPHRASE_ENV: &str = "CRYPTMIRROR_PASSPHRASE";

/// Default attribute cache TTL handed to the kernel (seconds)
pub const DEFAULT_ATTR_TTL_SECS: u64 = 1;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Encryption configuration
    pub encryption: EncryptionConfig,

    /// Mount configuration
    pub mount: MountConfig,
}

/// Encryption configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_iterations: u32,

    /// Argon2 parallelism
    pub argon2_parallelism: u32,

    /// Salt for key derivation (will be generated if not set)
    #[serde(with = "hex_serde")]
    pub salt: Vec<u8>,
}

/// Mount configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Filesystem name shown in the mount table
    pub fs_name: String,

    /// Allow other users to access the mount
    pub allow_other: bool,

    /// Allow root to access the mount
    pub allow_root: bool,

    /// Unmount automatically when the process exits
    pub auto_unmount: bool,

    /// Attribute/entry TTL for the kernel cache, in seconds
    pub attr_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            encryption: EncryptionConfig::default(),
            mount: MountConfig::default(),
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        EncryptionConfig {
            argon2_memory_kib: 65536, // 64 MiB
            argon2_iterations: 3,
            argon2_parallelism: 4,
            salt: Vec::new(), // Will be generated on first use
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            fs_name: "cryptmirror".to_string(),
            allow_other: false,
            allow_root: false,
            auto_unmount: true,
            attr_ttl_secs: DEFAULT_ATTR_TTL_SECS,
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cryptmirror")
            .join("config.json")
    }

    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration for use with a key, creating and saving a salt
    /// the first time. Later calls return the stored salt unchanged.
    pub fn load_initialized<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load_or_default(path.as_ref())?;
        if config.ensure_salt() {
            config.save(path.as_ref())?;
            tracing::info!("Generated key derivation salt in {:?}", path.as_ref());
        }
        Ok(config)
    }

    /// Generate a salt if none is recorded. Returns true if one was created.
    pub fn ensure_salt(&mut self) -> bool {
        if !self.encryption.salt.is_empty() {
            return false;
        }
        self.encryption.salt = crate::crypto::generate_salt().to_vec();
        true
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(memory) = std::env::var("CRYPTMIRROR_ARGON2_MEMORY_KIB") {
            if let Ok(kib) = memory.trim().parse::<u32>() {
                self.encryption.argon2_memory_kib = kib;
            }
        }

        if let Ok(allow_other) = std::env::var("CRYPTMIRROR_ALLOW_OTHER") {
            if let Ok(value) = allow_other.trim().parse::<bool>() {
                self.mount.allow_other = value;
            }
        }
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Argon2 requires at least 8 KiB per lane
        if self.encryption.argon2_memory_kib < 8 * self.encryption.argon2_parallelism.max(1) {
            return Err(Error::InvalidConfig(
                "Argon2 memory must be at least 8 KiB per lane".to_string(),
            ));
        }

        if self.encryption.argon2_iterations == 0 {
            return Err(Error::InvalidConfig(
                "Argon2 iterations must be greater than 0".to_string(),
            ));
        }

        if self.encryption.argon2_parallelism == 0 {
            return Err(Error::InvalidConfig(
                "Argon2 parallelism must be greater than 0".to_string(),
            ));
        }

        if !self.encryption.salt.is_empty()
            && self.encryption.salt.len() != crate::crypto::SALT_SIZE
        {
            return Err(Error::InvalidConfig(format!(
                "Salt must be {} bytes, got {}",
                crate::crypto::SALT_SIZE,
                self.encryption.salt.len()
            )));
        }

        if self.mount.fs_name.is_empty() {
            return Err(Error::InvalidConfig(
                "Filesystem name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Hex serialization for byte arrays
mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
