//! CLI configuration loaded from environment variables.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use zeroize::Zeroizing;

use lovelace_client::query::{BLOCKFROST_MAINNET, BLOCKFROST_PREPROD, BLOCKFROST_PREVIEW};
use lovelace_client::{BlockfrostConfig, SubmitConfig};
use lovelace_core::address::Network;
use lovelace_wallet::mnemonic::root_key_from_mnemonic;
use lovelace_wallet::ExtendedPrivateKey;

pub const DEFAULT_SUBMIT_URL: &str = lovelace_client::submit::DEFAULT_SUBMIT_URL;

/// Named chains; preprod and preview share the testnet network id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chain {
    Mainnet,
    Preprod,
    Preview,
}

impl Chain {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" => Ok(Chain::Mainnet),
            "preprod" => Ok(Chain::Preprod),
            "preview" | "testnet" => Ok(Chain::Preview),
            other => bail!("LOVELACE_NETWORK must be mainnet, preprod or preview (got '{other}')"),
        }
    }

    pub fn network(self) -> Network {
        match self {
            Chain::Mainnet => Network::Mainnet,
            Chain::Preprod | Chain::Preview => Network::Testnet,
        }
    }

    fn blockfrost_url(self) -> &'static str {
        match self {
            Chain::Mainnet => BLOCKFROST_MAINNET,
            Chain::Preprod => BLOCKFROST_PREPROD,
            Chain::Preview => BLOCKFROST_PREVIEW,
        }
    }
}

/// Where the root key comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySource {
    /// `LOVELACE_ROOT_KEY`: 96-byte extended key, hex.
    RootKey(Zeroizing<String>),
    /// `LOVELACE_MNEMONIC`, with optional `LOVELACE_PASSPHRASE`.
    Mnemonic { phrase: Zeroizing<String>, passphrase: Zeroizing<String> },
    /// Ask on the terminal.
    Prompt,
}

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub chain: Chain,
    /// Blockfrost project id (required for live queries).
    pub blockfrost_project_id: Option<String>,
    pub blockfrost_url: String,
    pub submit_url: String,
    pub keys: KeySource,
}

impl CliConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let chain = match get("LOVELACE_NETWORK") {
            Some(s) => Chain::parse(&s)?,
            None => Chain::Preview,
        };

        let blockfrost_project_id = get("BLOCKFROST_PROJECT_ID").filter(|s| !s.trim().is_empty());
        let blockfrost_url = get("BLOCKFROST_URL").unwrap_or_else(|| chain.blockfrost_url().to_string());
        let submit_url = get("LOVELACE_SUBMIT_URL").unwrap_or_else(|| DEFAULT_SUBMIT_URL.to_string());

        let keys = if let Some(hex) = get("LOVELACE_ROOT_KEY") {
            KeySource::RootKey(Zeroizing::new(hex))
        } else if let Some(phrase) = get("LOVELACE_MNEMONIC") {
            KeySource::Mnemonic {
                phrase: Zeroizing::new(phrase),
                passphrase: Zeroizing::new(get("LOVELACE_PASSPHRASE").unwrap_or_default()),
            }
        } else {
            KeySource::Prompt
        };

        Ok(CliConfig { chain, blockfrost_project_id, blockfrost_url, submit_url, keys })
    }

    pub fn network(&self) -> Network {
        self.chain.network()
    }

    pub fn blockfrost(&self) -> Result<BlockfrostConfig> {
        let project_id = self
            .blockfrost_project_id
            .clone()
            .context("BLOCKFROST_PROJECT_ID is required for live queries (or pass --snapshot)")?;
        Ok(BlockfrostConfig::new(self.blockfrost_url.clone(), project_id))
    }

    /// Submission settings. A Blockfrost URL gets the project id header.
    pub fn submit(&self) -> SubmitConfig {
        let project_id = if self.submit_url.contains("blockfrost.io") {
            self.blockfrost_project_id.clone()
        } else {
            None
        };
        SubmitConfig {
            url: self.submit_url.clone(),
            timeout: Duration::from_secs(30),
            project_id,
        }
    }

    /// Resolve the root key, prompting if neither variable is set.
    pub fn root_key(&self) -> Result<ExtendedPrivateKey> {
        match &self.keys {
            KeySource::RootKey(hex) => {
                ExtendedPrivateKey::from_hex(hex.trim()).context("LOVELACE_ROOT_KEY is not a valid extended key")
            }
            KeySource::Mnemonic { phrase, passphrase } => {
                root_key_from_mnemonic(phrase, passphrase).context("LOVELACE_MNEMONIC is not a valid phrase")
            }
            KeySource::Prompt => {
                let phrase = Zeroizing::new(
                    rpassword::prompt_password("Mnemonic: ").context("Failed to read mnemonic")?,
                );
                root_key_from_mnemonic(&phrase, "").context("Invalid mnemonic")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const PHRASE: &str = "eight country switch draw meat scout mystery blade tip drift useless good keep usage title";

    fn config(vars: &[(&str, &str)]) -> Result<CliConfig> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        CliConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.chain, Chain::Preview);
        assert_eq!(c.network(), Network::Testnet);
        assert_eq!(c.blockfrost_url, BLOCKFROST_PREVIEW);
        assert_eq!(c.submit_url, "http://localhost:8090/api/submit/tx");
        assert_eq!(c.keys, KeySource::Prompt);
        assert!(c.blockfrost().is_err());
    }

    #[test]
    fn mainnet_selects_mainnet_endpoints() {
        let c = config(&[("LOVELACE_NETWORK", "Mainnet"), ("BLOCKFROST_PROJECT_ID", "mainnetXYZ")]).unwrap();
        assert_eq!(c.network(), Network::Mainnet);
        let bf = c.blockfrost().unwrap();
        assert_eq!(bf.base_url, BLOCKFROST_MAINNET);
        assert_eq!(bf.project_id, "mainnetXYZ");
    }

    #[test]
    fn unknown_network_rejected() {
        assert!(config(&[("LOVELACE_NETWORK", "devnet")]).is_err());
    }

    #[test]
    fn blockfrost_submit_gets_project_id() {
        let c = config(&[
            ("BLOCKFROST_PROJECT_ID", "previewABC"),
            ("LOVELACE_SUBMIT_URL", "https://cardano-preview.blockfrost.io/api/v0/tx/submit"),
        ])
        .unwrap();
        assert_eq!(c.submit().project_id.as_deref(), Some("previewABC"));

        let local = config(&[("BLOCKFROST_PROJECT_ID", "previewABC")]).unwrap();
        assert!(local.submit().project_id.is_none());
    }

    #[test]
    fn root_key_takes_precedence_over_mnemonic() {
        let root = root_key_from_mnemonic(PHRASE, "").unwrap();
        let hex = hex::encode(root.as_bytes());
        let c = config(&[("LOVELACE_ROOT_KEY", &hex), ("LOVELACE_MNEMONIC", "not used")]).unwrap();
        assert_eq!(c.root_key().unwrap().as_bytes(), root.as_bytes());
    }

    #[test]
    fn mnemonic_with_passphrase() {
        let c = config(&[("LOVELACE_MNEMONIC", PHRASE), ("LOVELACE_PASSPHRASE", "foo")]).unwrap();
        let expected = root_key_from_mnemonic(PHRASE, "foo").unwrap();
        assert_eq!(c.root_key().unwrap().as_bytes(), expected.as_bytes());
    }

    #[test]
    fn bad_root_key_reports_variable() {
        let c = config(&[("LOVELACE_ROOT_KEY", "abcd")]).unwrap();
        let err = c.root_key().unwrap_err();
        assert!(err.to_string().contains("LOVELACE_ROOT_KEY"));
    }
}
