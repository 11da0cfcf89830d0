//! cryptmirror - encrypted passthrough filesystem
//!
//! Usage:
//!   cryptmirror init                          - Generate a key derivation salt
//!   cryptmirror mount <backing> <mount_point> - Mount the filesystem
//!   cryptmirror unmount <mount_point>         - Unmount the filesystem
//!   cryptmirror encrypt <in> <out>            - Encode a single file
//!   cryptmirror decrypt <in> <out>            - Decode a single file
//!   cryptmirror status                        - Show configuration

use clap::{Parser, Subcommand};
use cryptmirror::{
    config::{Config, PASSPHRASE_ENV},
    crypto::{self, MountKey},
    fs::{CryptFs, MountContext},
    Error, Result,
};
use nix::sys::stat::Mode;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "cryptmirror")]
#[command(version)]
#[command(about = "Mirror a directory through FUSE with transparently encrypted file contents")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a salt and write the configuration file
    Init {
        /// Replace an existing salt (files encrypted under it become unreadable)
        #[arg(long)]
        force: bool,
    },

    /// Mount the filesystem
    Mount {
        /// Directory holding the encrypted files
        backing_dir: PathBuf,

        /// Mount point directory
        mount_point: PathBuf,

        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,

        /// Passphrase (otherwise read from CRYPTMIRROR_PASSPHRASE or prompted)
        #[arg(short, long)]
        passphrase: Option<String>,
    },

    /// Unmount the filesystem
    Unmount {
        /// Mount point to unmount
        mount_point: PathBuf,
    },

    /// Encrypt a plaintext file into the backing format
    Encrypt {
        input: PathBuf,
        output: PathBuf,

        /// Passphrase (otherwise read from CRYPTMIRROR_PASSPHRASE or prompted)
        #[arg(short, long)]
        passphrase: Option<String>,
    },

    /// Decrypt a backing file to plaintext
    Decrypt {
        input: PathBuf,
        output: PathBuf,

        /// Passphrase (otherwise read from CRYPTMIRROR_PASSPHRASE or prompted)
        #[arg(short, long)]
        passphrase: Option<String>,
    },

    /// Show configuration status
    Status,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
    }

    let config_path = cli
        .config
        .map(|p| expand_tilde(&p))
        .unwrap_or_else(Config::default_path);

    if let Err(e) = run_command(cli.command, &config_path) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: &Path) -> Result<()> {
    match command {
        Commands::Init { force } => cmd_init(config_path, force),

        Commands::Mount {
            backing_dir,
            mount_point,
            allow_other,
            passphrase,
        } => cmd_mount(config_path, &backing_dir, &mount_point, allow_other, passphrase),

        Commands::Unmount { mount_point } => cmd_unmount(&mount_point),

        Commands::Encrypt {
            input,
            output,
            passphrase,
        } => cmd_encrypt(config_path, &input, &output, passphrase),

        Commands::Decrypt {
            input,
            output,
            passphrase,
        } => cmd_decrypt(config_path, &input, &output, passphrase),

        Commands::Status => cmd_status(config_path),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;

    if !config.encryption.salt.is_empty() && !force {
        return Err(Error::Config(format!(
            "{:?} already has a salt; pass --force to replace it",
            config_path
        )));
    }

    config.encryption.salt = crypto::generate_salt().to_vec();
    config.save(config_path)?;

    info!("Configuration saved to {:?}", config_path);
    info!("Next: cryptmirror mount <backing_dir> <mount_point>");
    Ok(())
}

fn cmd_mount(
    config_path: &Path,
    backing_dir: &Path,
    mount_point: &Path,
    allow_other: bool,
    passphrase: Option<String>,
) -> Result<()> {
    let mut config = Config::load_initialized(config_path)?;
    if allow_other {
        config.mount.allow_other = true;
    }

    let root = backing_dir
        .canonicalize()
        .map_err(|e| Error::from_io(e, backing_dir))?;
    if !root.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "{:?} is not a directory",
            root
        )));
    }
    if !mount_point.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "mount point {:?} is not a directory",
            mount_point
        )));
    }

    let key = load_key(&config, passphrase)?;
    let ctx = MountContext::new(root.clone(), key)?;
    let fs = CryptFs::new(ctx, &config.mount);

    // Modes handed to us by the kernel already have the caller's umask applied
    nix::sys::stat::umask(Mode::empty());

    info!("Mounting {:?} at {:?}", root, mount_point);
    let options = CryptFs::mount_options(&config.mount);
    fuser::mount2(fs, mount_point, &options).map_err(|e| Error::from_io(e, mount_point))?;

    info!("Unmounted {:?}", mount_point);
    Ok(())
}

fn cmd_unmount(mount_point: &Path) -> Result<()> {
    info!("Unmounting {:?}...", mount_point);

    #[cfg(target_os = "linux")]
    let output = std::process::Command::new("fusermount")
        .arg("-u")
        .arg(mount_point)
        .output()?;

    #[cfg(not(target_os = "linux"))]
    let output = std::process::Command::new("umount")
        .arg(mount_point)
        .output()?;

    if output.status.success() {
        info!("Unmounted successfully");
        Ok(())
    } else {
        Err(Error::Internal(format!(
            "Failed to unmount: {}",
            String::from_utf8_lossy(&output.stderr)
        )))
    }
}

fn cmd_encrypt(
    config_path: &Path,
    input: &Path,
    output: &Path,
    passphrase: Option<String>,
) -> Result<()> {
    let config = Config::load_initialized(config_path)?;
    let key = load_key(&config, passphrase)?;

    let plaintext = Zeroizing::new(std::fs::read(input).map_err(|e| Error::from_io(e, input))?);
    write_atomic(output, |file| crypto::encode_to(&plaintext, &key, file))?;

    info!("Encrypted {:?} -> {:?}", input, output);
    Ok(())
}

fn cmd_decrypt(
    config_path: &Path,
    input: &Path,
    output: &Path,
    passphrase: Option<String>,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let key = load_key(&config, passphrase)?;

    let blob = std::fs::read(input).map_err(|e| Error::from_io(e, input))?;
    let plaintext = Zeroizing::new(crypto::decode(&blob, &key)?);
    write_atomic(output, |file| file.write_all(&plaintext))?;

    info!("Decrypted {:?} -> {:?}", input, output);
    Ok(())
}

fn cmd_status(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;

    println!("cryptmirror status");
    println!("==================");
    println!();
    println!("Configuration: {:?}", config_path);
    println!(
        "Salt: {}",
        if config.encryption.salt.is_empty() {
            "not initialized (run 'cryptmirror init')"
        } else {
            "initialized"
        }
    );
    println!(
        "Argon2id: {} KiB, {} iterations, {} lanes",
        config.encryption.argon2_memory_kib,
        config.encryption.argon2_iterations,
        config.encryption.argon2_parallelism
    );
    println!("Filesystem name: {}", config.mount.fs_name);
    println!("Allow other: {}", config.mount.allow_other);
    println!("Auto unmount: {}", config.mount.auto_unmount);
    println!("Attribute TTL: {}s", config.mount.attr_ttl_secs);
    println!("Blob header: {} bytes", crypto::HEADER_SIZE);

    Ok(())
}

/// Pick the passphrase from the command line, falling back to the environment
fn given_passphrase(flag: Option<String>, env: Option<String>) -> Option<Zeroizing<String>> {
    flag.or(env).filter(|p| !p.is_empty()).map(Zeroizing::new)
}

/// Derive the mount key from the flag, the environment or an interactive prompt
fn load_key(config: &Config, flag: Option<String>) -> Result<MountKey> {
    let passphrase = match given_passphrase(flag, std::env::var(PASSPHRASE_ENV).ok()) {
        Some(p) => p,
        None => Zeroizing::new(
            rpassword::prompt_password("Enter encryption passphrase: ")
                .map_err(|e| Error::Internal(e.to_string()))?,
        ),
    };

    MountKey::from_passphrase(passphrase.as_bytes(), &config.encryption)
}

/// Write `output` through a temporary file in the same directory
fn write_atomic<F>(output: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut std::fs::File) -> std::io::Result<()>,
{
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::from_io(e, parent))?;
    fill(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(output)
        .map_err(|e| Error::from_io(e.error, output))?;
    Ok(())
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
