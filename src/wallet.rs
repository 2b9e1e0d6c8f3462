use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use sha2::{
    Digest,
    Sha256,
};
use tokio::sync::watch;
use tracing::info;

/// Source of the active wallet identity.
///
/// Account changes are published over a `watch` channel; dropping the
/// receiver tears the subscription down, so reconnecting a UI never stacks
/// duplicate handlers.
pub trait WalletConnector {
    async fn request_account(&self) -> Result<Option<String>>;

    fn subscribe(&self) -> watch::Receiver<Option<String>>;
}

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".wordpot").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("wallet") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

/// Reads the account address recorded in a keystore file without unlocking
/// it, the way a wallet UI shows accounts before any password prompt.
pub fn keystore_address(descriptor: &WalletDescriptor) -> Result<String> {
    let raw = fs::read_to_string(&descriptor.path).wrap_err_with(|| {
        format!("Failed to read wallet '{}'", descriptor.name)
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).wrap_err("Invalid keystore file")?;
    let address = value
        .get("address")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            eyre!("Wallet '{}' has no address field", descriptor.name)
        })?;
    if address.starts_with("0x") {
        Ok(address.to_string())
    } else {
        Ok(format!("0x{address}"))
    }
}

/// Wallet connector over a directory of local keystore files.
pub struct KeystoreWallet {
    dir: PathBuf,
    active: watch::Sender<Option<String>>,
}

impl KeystoreWallet {
    pub fn new(dir: PathBuf) -> Self {
        let (active, _) = watch::channel(None);
        Self { dir, active }
    }

    pub fn wallet_dir(&self) -> &Path {
        &self.dir
    }

    /// Unlocks the named wallet and publishes its address as the active
    /// account. The decrypted key material is checked and discarded; signing
    /// stays with the gateway.
    pub fn connect(&self, name: &str) -> Result<String> {
        let descriptor = find_wallet(&self.dir, name)?;
        let address = keystore_address(&descriptor)?;
        let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
        let password =
            prompt_password(prompt).wrap_err("Failed to read wallet password")?;
        let secret = decrypt_key(&descriptor.path, password.as_bytes())
            .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;
        verify_key_material(&descriptor.name, &secret)?;
        info!(
            wallet = %descriptor.name,
            fingerprint = %key_fingerprint(&secret),
            "wallet unlocked"
        );
        self.active.send_replace(Some(address.clone()));
        Ok(address)
    }

    pub fn disconnect(&self) {
        self.active.send_replace(None);
    }
}

impl WalletConnector for KeystoreWallet {
    async fn request_account(&self) -> Result<Option<String>> {
        Ok(self.active.borrow().clone())
    }

    fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.active.subscribe()
    }
}

fn verify_key_material(name: &str, secret: &[u8]) -> Result<()> {
    if secret.len() == 32 {
        return Ok(());
    }
    if let Ok(mnemonic) = std::str::from_utf8(secret) {
        let word_count = mnemonic.split_whitespace().count();
        if word_count >= 12 {
            return Ok(());
        }
    }
    Err(eyre!("Wallet '{name}' contained unsupported key material"))
}

fn key_fingerprint(secret: &[u8]) -> String {
    let digest = Sha256::digest(secret);
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_wallets_skips_foreign_files_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bob.wallet"), "{}").unwrap();
        fs::write(dir.path().join("alice.wallet"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let wallets = list_wallets(dir.path()).unwrap();

        let names: Vec<_> = wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn missing_directory_lists_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(list_wallets(&missing).unwrap().is_empty());
    }

    #[test]
    fn keystore_address_prefixes_bare_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.wallet");
        fs::write(&path, r#"{"address": "abc123"}"#).unwrap();
        let descriptor = WalletDescriptor::new("alice", path);
        assert_eq!(keystore_address(&descriptor).unwrap(), "0xabc123");
    }

    #[test]
    fn verify_key_material_accepts_raw_key_and_mnemonic() {
        assert!(verify_key_material("a", &[7u8; 32]).is_ok());
        let mnemonic = "word ".repeat(12);
        assert!(verify_key_material("a", mnemonic.as_bytes()).is_ok());
        assert!(verify_key_material("a", b"short").is_err());
    }

    #[tokio::test]
    async fn connect_state_flows_through_subscription() {
        let wallet = KeystoreWallet::new(PathBuf::from("/nonexistent"));
        let mut rx = wallet.subscribe();
        assert_eq!(wallet.request_account().await.unwrap(), None);

        wallet.active.send_replace(Some("0xABC".to_string()));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().clone(), Some("0xABC".to_string()));

        wallet.disconnect();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().clone(), None);
    }
}
