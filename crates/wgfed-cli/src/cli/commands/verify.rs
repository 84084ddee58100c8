//! `wgfed verify` - Verify signed state and print its data.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;

use wgfed_state::envelope::value_type_name;
use wgfed_state::{
    build_loader_chain, AesGcmMessageEncrypter, ConfigurationLoader,
    DecryptConfigurationLoaderProxy, DigestPlacement, Ed25519MessageSigner, StateConfig,
    StateError, TimeoutConfigurationLoader, VerifySignatureConfigurationLoaderProxy,
    WireguardInterface,
};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Signed state path or http(s) URL
    pub state: String,

    /// Public key file (SPKI PEM)
    #[arg(long)]
    pub pubkey: PathBuf,

    /// Require the public key to have this key_id (sha256:...)
    #[arg(long)]
    pub key_id: Option<String>,

    /// Read the digest from a separate resource next to the state
    #[arg(long)]
    pub detached: bool,

    /// Detached digest path or URL (implies --detached)
    #[arg(long)]
    pub digest: Option<String>,

    /// Treat a missing state as empty instead of failing
    #[arg(long)]
    pub if_exists: bool,

    /// Validate the mapping under this key as a WireGuard interface
    #[arg(long)]
    pub interface: Option<String>,

    /// Open sealed secret fields with this AES-256 key file
    #[arg(long)]
    pub encryption_key: Option<PathBuf>,

    /// Load deadline in seconds, digest included
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Quiet mode - only exit code, no output
    #[arg(long, short)]
    pub quiet: bool,
}

pub async fn cmd_verify(args: VerifyArgs) -> i32 {
    match run_verify(&args).await {
        Ok(()) => 0,
        Err(e) => {
            if !args.quiet {
                eprintln!("error: {e:#}");
            }
            super::exit_code_for(&e)
        }
    }
}

async fn run_verify(args: &VerifyArgs) -> Result<()> {
    let mut config = StateConfig::default()
        .with_state_path(args.state.clone())
        .with_public_key_path(args.pubkey.clone())
        .with_load_timeout_secs(args.timeout);
    if args.detached {
        config = config.with_digest_placement(DigestPlacement::Detached);
    }
    if let Some(digest) = &args.digest {
        config = config.with_digest_path(digest.clone());
    }
    config.validate()?;

    let mut signer = Ed25519MessageSigner::load_public_key_pem(&args.pubkey)
        .with_context(|| format!("failed to load public key: {}", args.pubkey.display()))?;
    if let Some(expected) = &args.key_id {
        signer = signer.require_key_id(expected)?;
    }
    let key_id = signer.key_id().to_string();

    let chain: Arc<dyn ConfigurationLoader> = Arc::new(build_loader_chain(&config)?);
    let mut verified: Arc<dyn ConfigurationLoader> =
        Arc::new(VerifySignatureConfigurationLoaderProxy::new(
            chain.clone(),
            chain,
            Arc::new(config.locations()),
            Arc::new(signer),
        ));
    if let Some(key_path) = &args.encryption_key {
        let encrypter = AesGcmMessageEncrypter::load_key_file(key_path)?;
        verified = Arc::new(DecryptConfigurationLoaderProxy::new(
            verified,
            Arc::new(encrypter),
        ));
    }
    let loader = TimeoutConfigurationLoader::new(verified, config.load_timeout());

    let data = if args.if_exists {
        loader.load_if_exists(&config.state_path).await?
    } else {
        loader.load(&config.state_path).await?
    };

    if let Some(key) = &args.interface {
        let interface = match data.get(key) {
            Some(JsonValue::Object(map)) => WireguardInterface::from_map(map)?,
            Some(other) => {
                return Err(StateError::invalid_data(format!(
                    "'{}' in {} must be a mapping, found {}",
                    key,
                    config.state_path,
                    value_type_name(other)
                ))
                .into())
            }
            None => {
                return Err(StateError::invalid_data(format!(
                    "no '{}' in {}",
                    key, config.state_path
                ))
                .into())
            }
        };
        if !args.quiet {
            eprintln!(
                "interface '{}' is valid ({} addresses, port {})",
                key,
                interface.address().len(),
                interface.listen_port()
            );
        }
    }

    if !args.quiet {
        eprintln!("Verification successful (key_id: {key_id})");
        println!("{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(())
}
