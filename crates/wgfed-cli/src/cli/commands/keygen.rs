//! `wgfed keygen` - Generate the keys that sign and seal state.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use wgfed_state::{AesGcmMessageEncrypter, Ed25519MessageSigner};

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Output directory for keypair files
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Force overwrite existing files
    #[arg(long, short)]
    pub force: bool,

    /// Also write an AES-256 key for sealing secret fields to this file
    #[arg(long)]
    pub encryption_key: Option<PathBuf>,
}

pub fn cmd_keygen(args: KeygenArgs) -> i32 {
    match run_keygen(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            super::exit_code_for(&e)
        }
    }
}

fn run_keygen(args: KeygenArgs) -> Result<()> {
    let signer = Ed25519MessageSigner::generate()?;
    let paths = signer
        .write_keypair(&args.out, args.force)
        .with_context(|| {
            format!(
                "failed to write keypair to {} (use --force to overwrite)",
                args.out.display()
            )
        })?;

    if let Some(key_path) = &args.encryption_key {
        AesGcmMessageEncrypter::generate()
            .write_key_file(key_path, args.force)
            .with_context(|| format!("failed to write encryption key: {}", key_path.display()))?;
    }

    println!("Generated ed25519 keypair:");
    println!(
        "  Private key: {} (PKCS#8 PEM, mode 0600)",
        paths.private_key.display()
    );
    println!("  Public key:  {} (SPKI PEM)", paths.public_key.display());
    if let Some(key_path) = &args.encryption_key {
        println!("  Encryption:  {} (AES-256, mode 0600)", key_path.display());
    }
    println!();
    println!("key_id: {}", signer.key_id());
    println!();
    println!("Distribute the public key to every node that loads this state.");

    Ok(())
}
