//! Active Wallet Selection
//!
//! Shared, mutable wallet/deployer selection read by the marker poll.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::ports::{WalletSource, WatchedWallets};

/// Wallet/deployer selection that can be changed while the feed runs.
#[derive(Debug, Clone, Default)]
pub struct ActiveWallets {
    inner: Arc<RwLock<WatchedWallets>>,
}

impl ActiveWallets {
    /// Start with the given selection.
    #[must_use]
    pub fn new(wallet: Option<String>, deployer: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(WatchedWallets { wallet, deployer })),
        }
    }

    /// Replace the followed wallet. `None` stops following.
    pub fn set_wallet(&self, wallet: Option<String>) {
        self.inner.write().wallet = wallet;
    }

    /// Replace the followed deployer. `None` stops following.
    pub fn set_deployer(&self, deployer: Option<String>) {
        self.inner.write().deployer = deployer;
    }
}

impl WalletSource for ActiveWallets {
    fn current(&self) -> WatchedWallets {
        self.inner.read().clone().normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_selection() {
        let wallets = ActiveWallets::new(Some("W1".into()), None);
        let other = wallets.clone();
        other.set_wallet(Some("W2".into()));
        other.set_deployer(Some(String::new()));

        let current = wallets.current();
        assert_eq!(current.wallet.as_deref(), Some("W2"));
        assert_eq!(current.deployer, None);
    }
}
