//! Liquidity ledger: per-mint balance and proof inventory
//!
//! A concurrent in-memory ledger mapping mint URL to balance and proofs.
//! Writers serialise per ledger, readers share; after every mutation the
//! balance equals the sum of held proof amounts. Wallets live in the broker;
//! the ledger only tracks inventory and an audit trail of changes.

use std::collections::HashMap;
use std::time::SystemTime;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::{Result, SwapError};
use crate::types::{total_amount, MintConfig, Proof};

const EVENT_LOG_CAP: usize = 4096;

/// Liquidity held on a single mint.
#[derive(Debug, Clone)]
pub struct MintLiquidity {
    pub mint_url: String,
    pub balance: u64,
    pub proofs: Vec<Proof>,
    pub last_updated: SystemTime,
}

/// Kind of inventory change, named as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEventType {
    Deposit,
    Withdrawal,
    SwapIn,
    SwapOut,
}

impl LedgerEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventType::Deposit => "deposit",
            LedgerEventType::Withdrawal => "withdrawal",
            LedgerEventType::SwapIn => "swap_in",
            LedgerEventType::SwapOut => "swap_out",
        }
    }
}

/// One inventory change record.
#[derive(Debug, Clone)]
pub struct LedgerEvent {
    pub mint_url: String,
    pub event_type: LedgerEventType,
    pub amount: u64,
    pub balance_after: u64,
    pub quote_id: Option<String>,
    pub timestamp: SystemTime,
}

/// Tracks the broker's ecash inventory across mints.
pub struct LiquidityManager {
    ledger: RwLock<HashMap<String, MintLiquidity>>,
    events: RwLock<Vec<LedgerEvent>>,
}

impl LiquidityManager {
    pub fn new(mints: &[MintConfig]) -> Self {
        let ledger = mints
            .iter()
            .map(|mint| {
                (
                    mint.mint_url.clone(),
                    MintLiquidity {
                        mint_url: mint.mint_url.clone(),
                        balance: 0,
                        proofs: Vec::new(),
                        last_updated: SystemTime::now(),
                    },
                )
            })
            .collect();

        Self {
            ledger: RwLock::new(ledger),
            events: RwLock::new(Vec::new()),
        }
    }

    pub async fn get_balance(&self, mint_url: &str) -> u64 {
        let ledger = self.ledger.read().await;
        ledger.get(mint_url).map(|l| l.balance).unwrap_or(0)
    }

    pub async fn get_proofs(&self, mint_url: &str) -> Vec<Proof> {
        let ledger = self.ledger.read().await;
        ledger
            .get(mint_url)
            .map(|l| l.proofs.clone())
            .unwrap_or_default()
    }

    /// Whether the current balance can cover `amount`.
    pub async fn can_serve(&self, mint_url: &str, amount: u64) -> bool {
        self.get_balance(mint_url).await >= amount
    }

    /// Append proofs; balance grows by their sum. Returns the new balance.
    pub async fn add_proofs(
        &self,
        mint_url: &str,
        proofs: Vec<Proof>,
        event_type: LedgerEventType,
        quote_id: Option<&str>,
    ) -> Result<u64> {
        let amount = total_amount(&proofs);
        let balance_after = {
            let mut ledger = self.ledger.write().await;
            let entry = ledger
                .get_mut(mint_url)
                .ok_or_else(|| SwapError::UnsupportedMint(mint_url.to_string()))?;
            entry.proofs.extend(proofs);
            entry.balance += amount;
            entry.last_updated = SystemTime::now();
            debug_assert_eq!(entry.balance, total_amount(&entry.proofs));
            entry.balance
        };

        info!(mint = %mint_url, amount, balance_after, "added liquidity");
        self.record_event(mint_url, event_type, amount, balance_after, quote_id)
            .await;
        Ok(balance_after)
    }

    /// Remove proofs by unique secret; balance shrinks by the sum of those
    /// actually held. Returns the new balance.
    pub async fn remove_proofs(
        &self,
        mint_url: &str,
        proofs_to_remove: &[Proof],
        event_type: LedgerEventType,
        quote_id: Option<&str>,
    ) -> Result<u64> {
        let (amount, balance_after) = {
            let mut ledger = self.ledger.write().await;
            let entry = ledger
                .get_mut(mint_url)
                .ok_or_else(|| SwapError::UnsupportedMint(mint_url.to_string()))?;

            let secrets: Vec<&String> = proofs_to_remove.iter().map(|p| &p.secret).collect();
            let mut removed = 0u64;
            entry.proofs.retain(|p| {
                if secrets.contains(&&p.secret) {
                    removed += p.amount;
                    false
                } else {
                    true
                }
            });
            entry.balance -= removed;
            entry.last_updated = SystemTime::now();
            debug_assert_eq!(entry.balance, total_amount(&entry.proofs));
            (removed, entry.balance)
        };

        info!(mint = %mint_url, amount, balance_after, "removed liquidity");
        self.record_event(mint_url, event_type, amount, balance_after, quote_id)
            .await;
        Ok(balance_after)
    }

    /// Greedy largest-first selection of proofs summing to at least `amount`.
    /// Read-only; see [`Self::reserve_proofs`] for the race-free variant.
    pub async fn select_proofs(&self, mint_url: &str, amount: u64) -> Result<Vec<Proof>> {
        let ledger = self.ledger.read().await;
        let entry = ledger
            .get(mint_url)
            .ok_or_else(|| SwapError::UnsupportedMint(mint_url.to_string()))?;
        Self::select_from(&entry.proofs, amount).ok_or_else(|| SwapError::InsufficientLiquidity {
            mint_url: mint_url.to_string(),
            needed: amount,
            available: entry.balance,
        })
    }

    /// Atomically select and remove proofs covering `amount` under one
    /// writer lock, so concurrent swaps cannot take the same inventory.
    pub async fn reserve_proofs(
        &self,
        mint_url: &str,
        amount: u64,
        quote_id: Option<&str>,
    ) -> Result<Vec<Proof>> {
        let (selected, taken, balance_after) = {
            let mut ledger = self.ledger.write().await;
            let entry = ledger
                .get_mut(mint_url)
                .ok_or_else(|| SwapError::UnsupportedMint(mint_url.to_string()))?;

            let selected = Self::select_from(&entry.proofs, amount).ok_or_else(|| {
                SwapError::InsufficientLiquidity {
                    mint_url: mint_url.to_string(),
                    needed: amount,
                    available: entry.balance,
                }
            })?;

            let secrets: Vec<&String> = selected.iter().map(|p| &p.secret).collect();
            entry.proofs.retain(|p| !secrets.contains(&&p.secret));
            let taken = total_amount(&selected);
            entry.balance -= taken;
            entry.last_updated = SystemTime::now();
            debug_assert_eq!(entry.balance, total_amount(&entry.proofs));
            (selected, taken, entry.balance)
        };

        self.record_event(
            mint_url,
            LedgerEventType::SwapOut,
            taken,
            balance_after,
            quote_id,
        )
        .await;
        Ok(selected)
    }

    fn select_from(available: &[Proof], amount: u64) -> Option<Vec<Proof>> {
        let mut sorted: Vec<&Proof> = available.iter().collect();
        sorted.sort_by(|a, b| b.amount.cmp(&a.amount));

        let mut selected = Vec::new();
        let mut taken = 0u64;
        for proof in sorted {
            if taken >= amount {
                break;
            }
            selected.push(proof.clone());
            taken += proof.amount;
        }
        if taken >= amount {
            Some(selected)
        } else {
            None
        }
    }

    pub async fn get_all_liquidity(&self) -> Vec<MintLiquidity> {
        let ledger = self.ledger.read().await;
        ledger.values().cloned().collect()
    }

    pub async fn supported_mints(&self) -> Vec<String> {
        let ledger = self.ledger.read().await;
        ledger.keys().cloned().collect()
    }

    /// Most recent inventory changes, newest last.
    pub async fn recent_events(&self, limit: usize) -> Vec<LedgerEvent> {
        let events = self.events.read().await;
        let start = events.len().saturating_sub(limit);
        events[start..].to_vec()
    }

    /// Take all pending inventory changes, clearing the log. Used by the
    /// persistence layer to move events into durable storage.
    pub async fn drain_events(&self) -> Vec<LedgerEvent> {
        let mut events = self.events.write().await;
        std::mem::take(&mut *events)
    }

    async fn record_event(
        &self,
        mint_url: &str,
        event_type: LedgerEventType,
        amount: u64,
        balance_after: u64,
        quote_id: Option<&str>,
    ) {
        let mut events = self.events.write().await;
        if events.len() >= EVENT_LOG_CAP {
            events.remove(0);
        }
        events.push(LedgerEvent {
            mint_url: mint_url.to_string(),
            event_type,
            amount,
            balance_after,
            quote_id: quote_id.map(str::to_string),
            timestamp: SystemTime::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn mint_configs() -> Vec<MintConfig> {
        vec![
            MintConfig {
                mint_url: "http://mint-a.test".to_string(),
                name: "Mint A".to_string(),
                unit: "sat".to_string(),
            },
            MintConfig {
                mint_url: "http://mint-b.test".to_string(),
                name: "Mint B".to_string(),
                unit: "sat".to_string(),
            },
        ]
    }

    fn proof(amount: u64, secret: &str) -> Proof {
        Proof {
            amount,
            id: "keyset".to_string(),
            secret: secret.to_string(),
            c: "02aa".to_string(),
            witness: None,
        }
    }

    async fn assert_invariant(manager: &LiquidityManager, mint_url: &str) {
        let balance = manager.get_balance(mint_url).await;
        let proofs = manager.get_proofs(mint_url).await;
        assert_eq!(balance, total_amount(&proofs));
    }

    #[tokio::test]
    async fn balance_tracks_proof_sum() {
        let manager = LiquidityManager::new(&mint_configs());
        let mint = "http://mint-a.test";

        manager
            .add_proofs(
                mint,
                vec![proof(8, "s1"), proof(4, "s2")],
                LedgerEventType::Deposit,
                None,
            )
            .await
            .unwrap();
        assert_eq!(manager.get_balance(mint).await, 12);
        assert_invariant(&manager, mint).await;

        manager
            .remove_proofs(mint, &[proof(8, "s1")], LedgerEventType::SwapOut, None)
            .await
            .unwrap();
        assert_eq!(manager.get_balance(mint).await, 4);
        assert_invariant(&manager, mint).await;
    }

    #[tokio::test]
    async fn removal_is_by_unique_secret() {
        let manager = LiquidityManager::new(&mint_configs());
        let mint = "http://mint-a.test";
        manager
            .add_proofs(
                mint,
                vec![proof(2, "keep"), proof(2, "drop")],
                LedgerEventType::Deposit,
                None,
            )
            .await
            .unwrap();

        // amount matches another proof; only the named secret leaves
        manager
            .remove_proofs(mint, &[proof(2, "drop")], LedgerEventType::SwapOut, None)
            .await
            .unwrap();
        let remaining = manager.get_proofs(mint).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].secret, "keep");
    }

    #[tokio::test]
    async fn selection_is_greedy_largest_first() {
        let manager = LiquidityManager::new(&mint_configs());
        let mint = "http://mint-a.test";
        manager
            .add_proofs(
                mint,
                vec![proof(1, "a"), proof(8, "b"), proof(2, "c")],
                LedgerEventType::Deposit,
                None,
            )
            .await
            .unwrap();

        let selected = manager.select_proofs(mint, 9).await.unwrap();
        assert_eq!(selected[0].amount, 8);
        assert_eq!(selected[1].amount, 2);
        assert_eq!(total_amount(&selected), 10);
    }

    #[tokio::test]
    async fn insufficient_inventory_is_an_error() {
        let manager = LiquidityManager::new(&mint_configs());
        let mint = "http://mint-a.test";
        manager
            .add_proofs(mint, vec![proof(4, "only")], LedgerEventType::Deposit, None)
            .await
            .unwrap();

        let err = manager.select_proofs(mint, 5).await.unwrap_err();
        assert!(matches!(err, SwapError::InsufficientLiquidity { .. }));
    }

    #[tokio::test]
    async fn unknown_mint_is_rejected() {
        let manager = LiquidityManager::new(&mint_configs());
        let err = manager
            .add_proofs(
                "http://elsewhere.test",
                vec![proof(1, "x")],
                LedgerEventType::Deposit,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::UnsupportedMint(_)));
    }

    #[tokio::test]
    async fn concurrent_reservations_cannot_double_spend_inventory() {
        let manager = Arc::new(LiquidityManager::new(&mint_configs()));
        let mint = "http://mint-a.test";
        manager
            .add_proofs(mint, vec![proof(8, "solo")], LedgerEventType::Deposit, None)
            .await
            .unwrap();

        let a = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.reserve_proofs("http://mint-a.test", 8, None).await })
        };
        let b = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.reserve_proofs("http://mint-a.test", 8, None).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert_eq!(manager.get_balance(mint).await, 0);
        assert_invariant(&manager, mint).await;
    }

    #[tokio::test]
    async fn events_record_balance_after() {
        let manager = LiquidityManager::new(&mint_configs());
        let mint = "http://mint-a.test";
        manager
            .add_proofs(
                mint,
                vec![proof(8, "e1")],
                LedgerEventType::Deposit,
                Some("q1"),
            )
            .await
            .unwrap();
        manager
            .remove_proofs(mint, &[proof(8, "e1")], LedgerEventType::SwapOut, Some("q1"))
            .await
            .unwrap();

        let events = manager.recent_events(10).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].balance_after, 8);
        assert_eq!(events[1].balance_after, 0);
        assert_eq!(events[1].quote_id.as_deref(), Some("q1"));
    }
}
