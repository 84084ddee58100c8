//! Subcommand implementations.

pub mod keygen;
pub mod sign;
pub mod verify;

use wgfed_state::{EncryptionError, SignatureError, StateError, ValidationError};

use super::args::{Cli, Command};

pub async fn dispatch(cli: Cli) -> i32 {
    match cli.cmd {
        Command::Keygen(args) => keygen::cmd_keygen(args),
        Command::Sign(args) => sign::cmd_sign(args).await,
        Command::Verify(args) => verify::cmd_verify(args).await,
    }
}

/// Exit code for a failed command, taken from the first state error in the chain.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(state_err) = cause.downcast_ref::<StateError>() {
            return state_err.exit_code();
        }
        if cause.downcast_ref::<SignatureError>().is_some() {
            return 4;
        }
        if cause.downcast_ref::<ValidationError>().is_some() {
            return 3;
        }
        if let Some(encryption_err) = cause.downcast_ref::<EncryptionError>() {
            return StateError::from(encryption_err.clone()).exit_code();
        }
    }
    1
}
