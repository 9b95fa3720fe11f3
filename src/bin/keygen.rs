//! Signing secret generator for stream-gate.
//!
//! Generates a random 32-byte token signing secret and outputs:
//! - The hex secret on stdout (for `STREAM_GATE_SECRET`)
//! - Optionally, a TOML snippet saved to a file (for `config.toml`)
//!
//! Usage:
//!   cargo run --bin stream-gate-keygen [output-file]

use rand::rngs::OsRng;
use rand::RngCore;
use std::env;
use std::fs;
use std::path::PathBuf;
use stream_gate::token::{check_strength, MIN_SECRET_LEN};
use zeroize::Zeroizing;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let output = env::args().nth(1).map(PathBuf::from);

    // redraw on the rare key that fails the distinct-byte check
    let mut secret = Zeroizing::new([0u8; MIN_SECRET_LEN]);
    loop {
        OsRng.fill_bytes(secret.as_mut());
        if check_strength(secret.as_ref()).is_ok() {
            break;
        }
    }
    let secret_hex = Zeroizing::new(hex::encode(&*secret));

    eprintln!("Generated {MIN_SECRET_LEN}-byte token signing secret");

    if let Some(path) = output {
        let snippet = Zeroizing::new(format!(
            "# Generated {}\n[token]\nsecret_hex = \"{}\"\n",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            secret_hex.as_str()
        ));
        fs::write(&path, snippet.as_bytes())?;
        eprintln!("Config snippet saved to: {}", path.display());
        eprintln!("  WARNING: Keep this file secure! Anyone holding it can mint access tokens.");
    } else {
        println!("{}", secret_hex.as_str());
    }

    Ok(())
}
