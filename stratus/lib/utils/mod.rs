//! Common utilities shared by backend realisations.

use ssh_key::{
    private::{KeypairData, PrivateKey, RsaKeypair},
    rand_core::OsRng,
    LineEnding,
};

use crate::{api::KeyPair, StratusError, StratusResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The modulus size of generated RSA key pairs.
const RSA_KEY_BITS: usize = 2048;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Generates an RSA-2048 key pair named `name`.
///
/// The public half is returned in OpenSSH `authorized_keys` format, the
/// private half PEM-encoded. Backends register only the public half; the
/// private key never leaves the caller.
pub fn generate_key_pair(name: &str) -> StratusResult<KeyPair> {
    let keypair = RsaKeypair::random(&mut OsRng, RSA_KEY_BITS)
        .map_err(|err| StratusError::backend_msg("error generating rsa key pair", err))?;
    let private = PrivateKey::new(KeypairData::Rsa(keypair), name)
        .map_err(|err| StratusError::backend_msg("error encoding private key", err))?;

    let public_key = private
        .public_key()
        .to_openssh()
        .map_err(|err| StratusError::backend_msg("error encoding public key", err))?;
    let private_key = private
        .to_openssh(LineEnding::LF)
        .map_err(|err| StratusError::backend_msg("error encoding private key", err))?;

    Ok(KeyPair {
        id: name.to_string(),
        name: name.to_string(),
        public_key,
        private_key: private_key.to_string(),
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "RSA key generation is slow without optimizations"]
    fn test_generate_key_pair_produces_openssh_material() -> anyhow::Result<()> {
        let kp = generate_key_pair("kp-test")?;
        assert_eq!(kp.id, "kp-test");
        assert!(kp.public_key.starts_with("ssh-rsa "));
        assert!(kp.public_key.trim_end().ends_with("kp-test"));
        assert!(kp.private_key.contains("BEGIN OPENSSH PRIVATE KEY"));
        Ok(())
    }
}
