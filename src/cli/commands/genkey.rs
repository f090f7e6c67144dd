use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config;
use crate::keystore::{generate_private_key_pem, KeyStore};

#[derive(Args, Debug)]
pub struct GenkeyArgs {
    #[arg(long, help = "Key folder (defaults to AUTH_KEYS_FOLDER)")]
    pub folder: Option<PathBuf>,

    #[arg(long, help = "Key id (defaults to a random UUID)")]
    pub kid: Option<String>,
}

pub fn handle(args: GenkeyArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let folder = args
        .folder
        .unwrap_or_else(|| PathBuf::from(&config::config().auth.keys_folder));
    let kid = args.kid.unwrap_or_else(|| Uuid::new_v4().to_string());

    let path = write_key(&folder, &kid)?;

    // Re-read through the key store so the printed public key is what the service will derive.
    let keys = KeyStore::load(&folder).context("reloading key folder")?;
    let public_pem = keys.public_key(&kid)?;

    output_success(
        &output_format,
        &format!("Generated key {} at {}", kid, path.display()),
        json!({
            "kid": kid,
            "path": path.display().to_string(),
            "public_key": public_pem,
        }),
        Some(&public_pem),
    )
}

/// Write a new private key as `<folder>/<kid>.pem`, never overwriting an existing file.
pub fn write_key(folder: &Path, kid: &str) -> anyhow::Result<PathBuf> {
    if kid.is_empty() || kid.contains(['/', '\\']) || kid.starts_with('.') {
        anyhow::bail!("invalid key id '{}'", kid);
    }

    fs::create_dir_all(folder)
        .with_context(|| format!("creating key folder {}", folder.display()))?;

    let path = folder.join(format!("{kid}.pem"));
    let pem = generate_private_key_pem()?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(&path)
        .with_context(|| format!("creating key file {}", path.display()))?;
    file.write_all(pem.as_bytes())?;

    Ok(path)
}
