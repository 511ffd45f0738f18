//! Keys command - show the audit signing identity.

use procura_config::Config;
use procura_crypto::KeyPair;

use crate::config_bridge;
use crate::theme::Theme;

/// Show the signing key, generating one on first use.
pub(crate) fn show_key(cfg: &Config) -> anyhow::Result<()> {
    let key_path = config_bridge::key_path(cfg)?;
    if !key_path.exists() {
        println!("{}", Theme::info("No signing key found. Generating one..."));
    }

    let key = KeyPair::load_or_generate(&key_path)?;
    let public = key.public_key();

    println!("\n{}", Theme::header("Audit Signing Key"));
    println!("  Key ID:     {}", public.key_id());
    println!("  Public key: {}", public.to_hex());
    println!("  Key file:   {}", key_path.display());
    println!();

    Ok(())
}
