//! Derive-key command implementation.

use ledgersync_core::crypto::{make_salt, EncryptionKey, KDF_ITERATIONS};

/// Runs the derive-key command.
///
/// Prints the salt and the base64 key. The key is secret; this is meant for
/// debugging a file whose password you already know.
pub fn run(password: &str, salt: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let salt = match salt {
        Some(salt) => salt.to_string(),
        None => make_salt(),
    };
    let key = EncryptionKey::derive(password, &salt);

    println!("Salt:        {salt}");
    println!("Iterations:  {KDF_ITERATIONS}");
    println!("Key:         {}", key.to_base64());
    Ok(())
}
