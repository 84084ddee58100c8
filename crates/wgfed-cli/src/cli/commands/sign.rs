//! `wgfed sign` - Sign a data document into a state envelope.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use wgfed_state::{
    AesGcmMessageEncrypter, ConfigurationLoader, ConfigurationLocationFinder, ConfigurationSaver,
    DigestPlacement, Ed25519MessageSigner, EncryptConfigurationSaverProxy, FileConfigurationLoader,
    FileConfigurationSaver, NormalizeFilterConfigurationSaverProxy, SignConfigurationSaverProxy,
    StateLocations,
};

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Unsigned data document (YAML or JSON mapping)
    pub data: PathBuf,

    /// Private key file (PKCS#8 PEM)
    #[arg(long)]
    pub key: PathBuf,

    /// Output state file; the extension selects YAML or JSON
    #[arg(long)]
    pub out: PathBuf,

    /// Write the digest to a separate resource next to the state
    #[arg(long)]
    pub detached: bool,

    /// Detached digest path (implies --detached)
    #[arg(long)]
    pub digest_out: Option<PathBuf>,

    /// Seal secret fields with this AES-256 key file before signing
    #[arg(long)]
    pub encryption_key: Option<PathBuf>,
}

pub async fn cmd_sign(args: SignArgs) -> i32 {
    match run_sign(args).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            super::exit_code_for(&e)
        }
    }
}

async fn run_sign(args: SignArgs) -> Result<()> {
    let data_locator = args.data.to_string_lossy().into_owned();
    let data = FileConfigurationLoader::new()
        .load(&data_locator)
        .await
        .with_context(|| format!("failed to read data: {}", args.data.display()))?;

    let signer = Ed25519MessageSigner::load_private_key_pem(&args.key)
        .with_context(|| format!("failed to load signing key: {}", args.key.display()))?;
    let key_id = signer.key_id().to_string();

    let out = args.out.to_string_lossy().into_owned();
    let placement = if args.detached || args.digest_out.is_some() {
        DigestPlacement::Detached
    } else {
        DigestPlacement::Inline
    };
    let mut locations = StateLocations::new(out.clone(), placement);
    if let Some(digest_out) = &args.digest_out {
        locations = locations.with_digest_locator(digest_out.to_string_lossy().into_owned());
    }
    let digest_locator =
        (!locations.state_digest_belongs_to_state()).then(|| locations.state_digest().to_string());

    let mut saver: Arc<dyn ConfigurationSaver> = Arc::new(SignConfigurationSaverProxy::new(
        Arc::new(FileConfigurationSaver::new()),
        Arc::new(locations),
        Arc::new(signer),
    ));
    if let Some(key_path) = &args.encryption_key {
        let encrypter = AesGcmMessageEncrypter::load_key_file(key_path)?;
        saver = Arc::new(EncryptConfigurationSaverProxy::new(saver, Arc::new(encrypter)));
    }
    NormalizeFilterConfigurationSaverProxy::new(saver)
        .save(&data, &out)
        .await?;

    println!("Signed {} entries from {}", data.len(), args.data.display());
    println!();
    println!("  state:  {out}");
    if let Some(digest_locator) = digest_locator {
        println!("  digest: {digest_locator}");
    }
    println!("  key_id: {key_id}");

    Ok(())
}
