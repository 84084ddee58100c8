use clap::{Parser, Subcommand};

use super::commands::{keygen, sign, verify};

#[derive(Parser, Debug)]
#[command(
    name = "wgfed",
    version,
    about = "Sign and verify wg-federation state"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate ed25519 keypair for signing state
    Keygen(keygen::KeygenArgs),

    /// Sign a data document into a state envelope
    Sign(sign::SignArgs),

    /// Verify signed state and print its data
    Verify(verify::VerifyArgs),
}
