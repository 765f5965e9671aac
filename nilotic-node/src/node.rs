//! The node facade: one owned value tying the ledger, the producer and
//! the PoRC engine together. The HTTP adapter calls these methods;
//! nothing here is global state.

use log::{info, warn};
use nilotic_core::odero::{self, OderoToken};
use nilotic_core::{CoreError, Ledger, Producer, TransactionStatus};
use nilotic_crypto::sha256_hex;
use nilotic_porc::PorcEngine;
use nilotic_shared_types::{Block, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Node {
    pub ledger: Arc<Ledger>,
    pub producer: Arc<Producer>,
    pub porc: Arc<PorcEngine>,
    shutdown: Arc<AtomicBool>,
}

impl Node {
    pub fn new(ledger: Arc<Ledger>, producer: Arc<Producer>, porc: Arc<PorcEngine>) -> Self {
        Node {
            ledger,
            producer,
            porc,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signals the maintenance and bridge threads to exit.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Forwards block-mined ledger events to the PoRC engine on a
    /// dedicated thread. The thread polls the shutdown flag roughly
    /// once per second.
    pub fn start_event_bridge(&self) -> JoinHandle<()> {
        let events = self.ledger.subscribe();
        let porc = Arc::clone(&self.porc);
        let shutdown = Arc::clone(&self.shutdown);
        std::thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                match events.recv_timeout(Duration::from_secs(1)) {
                    Ok(nilotic_core::LedgerEvent::BlockMined {
                        height,
                        collected_fees,
                        ..
                    }) => porc.on_block_mined(height, collected_fees),
                    Ok(_) => {}
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("Event bridge stopped");
        })
    }

    /// Periodic maintenance: snapshot every 60 seconds plus a chain
    /// validity check. Snapshot failures are logged and the loop
    /// continues.
    pub fn start_maintenance(&self, snapshot_path: std::path::PathBuf) -> JoinHandle<()> {
        let ledger = Arc::clone(&self.ledger);
        let shutdown = Arc::clone(&self.shutdown);
        std::thread::spawn(move || {
            info!("Maintenance task started");
            'outer: loop {
                for _ in 0..60 {
                    if shutdown.load(Ordering::SeqCst) {
                        break 'outer;
                    }
                    std::thread::sleep(Duration::from_secs(1));
                }
                if let Err(err) = ledger.snapshot_to(&snapshot_path) {
                    warn!("periodic snapshot failed: {}", err);
                }
                if !ledger.validate_and_recover() {
                    warn!("chain validation failed and could not recover");
                }
            }
            info!("Maintenance task stopped");
        })
    }

    pub fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "Nilotic Blockchain API is running",
            "version": NODE_VERSION,
            "chain_height": self.ledger.chain_height(),
            "pending_transactions": self.ledger.pending_count(),
            "difficulty": self.ledger.difficulty(),
            "mining_reward": self.ledger.mining_reward(),
        })
    }

    pub fn chain_info(&self, include_blocks: bool, limit: usize) -> serde_json::Value {
        let mut response = serde_json::json!({
            "chain_height": self.ledger.chain_height(),
        });
        if include_blocks {
            response["blocks"] = serde_json::json!(self.ledger.last_blocks(limit));
        }
        response
    }

    /// Builds, signs and admits a transfer.
    pub fn create_transaction(
        &self,
        sender: &str,
        recipient: &str,
        amount: f64,
    ) -> Result<Transaction, CoreError> {
        let mut tx = Transaction::new(sender, recipient, amount);
        demo_sign(&mut tx);
        self.ledger.submit_transaction(tx.clone())?;
        Ok(tx)
    }

    pub fn mine(&self, miner: &str) -> Result<Block, CoreError> {
        let block = self.producer.mine_block(miner, 0)?;
        if block.is_invalid() {
            return Err(CoreError::InvalidBlock(
                "mining stopped without a solution".into(),
            ));
        }
        Ok(block)
    }

    pub fn validate_pos(
        &self,
        validator: &str,
        signature: &str,
        public_key: Option<&str>,
    ) -> Result<Block, CoreError> {
        self.producer.validate_block_pos(validator, signature, public_key)
    }

    pub fn transaction_status(&self, hash: &str) -> TransactionStatus {
        self.ledger.transaction_status(hash)
    }

    /// Issues an Odero SLW token plus its offline issuance transaction.
    pub fn odero_create(
        &self,
        creator: &str,
        amount: f64,
    ) -> Result<(OderoToken, Transaction), CoreError> {
        if creator.is_empty() || amount <= 0.0 {
            return Err(CoreError::InvalidInput(
                "creator and a positive amount are required".into(),
            ));
        }
        let token = OderoToken::issue(creator, amount);
        let mut tx = token.creation_transaction();
        demo_sign(&mut tx);
        self.ledger.submit_transaction(tx.clone())?;
        Ok((token, tx))
    }

    pub fn odero_redeem(&self, redeemer: &str, token_id: &str) -> Result<Transaction, CoreError> {
        let tx = odero::redemption_transaction(redeemer, token_id)?;
        self.ledger.submit_transaction(tx.clone())?;
        Ok(tx)
    }

    pub fn odero_verify(&self, token_id: &str) -> (String, bool) {
        let normalized = odero::normalize_token_id(token_id);
        let valid = odero::is_valid_token_id(&normalized);
        (normalized, valid)
    }
}

/// Demo signing used by the request surface: a digest over the content
/// hash and a fixed key. Real deployments sign client-side; the ledger
/// only requires a present signature for non-coinbase senders.
pub fn demo_sign(tx: &mut Transaction) {
    tx.signature = sha256_hex(format!("{}demo-key", tx.hash).as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use nilotic_core::MiningConfig;
    use nilotic_crypto::Ed25519Verifier;
    use nilotic_porc::PorcStore;
    use nilotic_shared_types::GENESIS;

    fn test_node() -> Node {
        let ledger = Arc::new(Ledger::with_parameters(1, 100.0));
        let producer = Arc::new(Producer::new(
            Arc::clone(&ledger),
            MiningConfig {
                min_difficulty: 1,
                ..MiningConfig::default()
            },
            Arc::new(Ed25519Verifier),
        ));
        let porc = Arc::new(PorcEngine::new(
            Arc::clone(&ledger),
            Arc::new(Ed25519Verifier),
            PorcStore::in_memory().unwrap(),
        ));
        Node::new(ledger, producer, porc)
    }

    #[test]
    fn status_reports_chain_shape() {
        let node = test_node();
        let status = node.status();
        assert_eq!(status["chain_height"], 1);
        assert_eq!(status["pending_transactions"], 0);
        assert_eq!(status["mining_reward"], 100.0);
    }

    #[test]
    fn create_transaction_signs_and_admits() {
        let node = test_node();
        let tx = node.create_transaction(GENESIS, "NILalice", 50.0).unwrap();
        assert!(!tx.signature.is_empty());
        assert_eq!(node.ledger.pending_count(), 1);

        assert!(node.create_transaction("NILpoor", "NILbob", 1.0).is_err());
    }

    #[test]
    fn mine_commits_a_block() {
        let node = test_node();
        node.create_transaction(GENESIS, "NILalice", 50.0).unwrap();
        let block = node.mine("NILminer").unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(node.ledger.chain_height(), 2);
    }

    #[test]
    fn odero_issue_verify_redeem_flow() {
        let node = test_node();
        let (token, tx) = node.odero_create(GENESIS, 12.0).unwrap();
        assert!(token.verify());
        assert!(tx.is_offline);
        assert_eq!(node.ledger.pending_count(), 1);

        let (normalized, valid) = node.odero_verify(&token.token_id);
        assert!(valid);
        assert_eq!(normalized, token.token_id);

        let doubled = format!("{}{}", token.token_id, token.token_id);
        let (normalized, valid) = node.odero_verify(&doubled);
        assert!(valid);
        assert_eq!(normalized, token.token_id);

        let redemption = node.odero_redeem("NILredeemer", &token.token_id).unwrap();
        assert!(redemption.is_coinbase());
        assert_eq!(node.ledger.pending_count(), 2);

        assert!(node.odero_redeem("NILredeemer", "BADID").is_err());
    }

    #[test]
    fn event_bridge_drives_porc_height() {
        let node = test_node();
        let bridge = node.start_event_bridge();
        node.create_transaction(GENESIS, "NILalice", 50.0).unwrap();
        node.mine("NILminer").unwrap();

        // The bridge thread applies the event asynchronously.
        for _ in 0..100 {
            if node.porc.current_height() == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(node.porc.current_height(), 1);

        node.request_shutdown();
        bridge.join().unwrap();
    }

    #[test]
    fn maintenance_snapshots_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockchain_data.json");
        let node = test_node();
        let handle = node.start_maintenance(path);
        node.request_shutdown();
        handle.join().unwrap();
    }
}
