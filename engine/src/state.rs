//! World state accessor.
//!
//! `StateDb` is the seam between the dispatcher and account storage. The
//! dispatcher only reads and writes through this trait, takes snapshots
//! before every frame and reverts to them when a frame fails.
//!
//! `MemoryState` is the in-memory implementation. Every mutation records
//! an undo entry in a [`Journal`]; reverting to a snapshot replays those
//! entries newest-first. `finalise()` clears the journal between
//! transactions so earlier transactions can no longer be undone.

use std::collections::BTreeMap;

use corevm_primitives::{
    codec::encode_account_leaf,
    crypto::keccak256,
    Address, Hash, Journal, Log, MerkleTree, Snapshot, Wei, EMPTY_CODE_HASH, ZERO_HASH,
};

/// Account storage and bookkeeping used by the dispatcher and the
/// transaction pipeline.
///
/// Reads of missing accounts return zero values. Writes to missing
/// accounts create them.
pub trait StateDb {
    /// Returns true if the account exists, even if it is empty.
    fn exists(&self, address: &Address) -> bool;

    /// Returns true if the account is missing or has zero nonce, zero
    /// balance and no code.
    fn is_empty(&self, address: &Address) -> bool;

    /// Create a fresh account, replacing any existing one but keeping its
    /// balance.
    fn create_account(&mut self, address: Address);

    fn balance(&self, address: &Address) -> Wei;
    fn set_balance(&mut self, address: Address, balance: Wei);

    /// Credit `amount`. Saturates at `Wei::MAX`.
    fn add_balance(&mut self, address: Address, amount: Wei) {
        let balance = self.balance(&address).saturating_add(amount);
        self.set_balance(address, balance);
    }

    /// Debit `amount`. Callers check the balance first; saturates at zero.
    fn sub_balance(&mut self, address: Address, amount: Wei) {
        let balance = self.balance(&address).saturating_sub(amount);
        self.set_balance(address, balance);
    }

    fn nonce(&self, address: &Address) -> u64;
    fn set_nonce(&mut self, address: Address, nonce: u64);

    fn code(&self, address: &Address) -> Vec<u8>;

    /// Keccak-256 of the account's code; `ZERO_HASH` for a missing account.
    fn code_hash(&self, address: &Address) -> Hash;

    fn code_size(&self, address: &Address) -> usize {
        self.code(address).len()
    }

    fn set_code(&mut self, address: Address, code: Vec<u8>);

    fn storage(&self, address: &Address, key: &Hash) -> Hash;
    fn set_storage(&mut self, address: Address, key: Hash, value: Hash);

    /// Add to the gas refund counter of the current transaction.
    fn add_refund(&mut self, gas: u64);
    /// Remove from the gas refund counter. Saturates at zero.
    fn sub_refund(&mut self, gas: u64);
    fn refund(&self) -> u64;

    /// Mark the current state and return a token for reverting to it.
    fn snapshot(&mut self) -> Snapshot;

    /// Undo every mutation made after `snapshot` was taken, including log
    /// emission. Snapshots taken after it become invalid.
    fn revert_to_snapshot(&mut self, snapshot: Snapshot);

    /// Record a log under the transaction set by [`StateDb::prepare`].
    fn add_log(&mut self, log: Log);

    /// Logs recorded under `tx_hash`, in emission order.
    fn logs(&self, tx_hash: &Hash) -> Vec<Log>;

    /// Set the transaction that subsequent logs are attributed to.
    /// `tx_index == 0` starts a new block and drops the previous block's
    /// logs.
    fn prepare(&mut self, tx_hash: Hash, tx_index: usize);

    /// Make all pending mutations permanent and reset the refund counter.
    fn finalise(&mut self);

    /// Deterministic commitment to all accounts and their storage.
    fn state_root(&self) -> Hash;
}

/// A single account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub balance: Wei,
    pub nonce: u64,
    pub code: Vec<u8>,
    pub code_hash: Hash,
    /// Non-zero storage slots. Writing zero removes the slot.
    pub storage: BTreeMap<Hash, Hash>,
}

impl Account {
    /// Account holding only a balance.
    pub fn with_balance(balance: Wei) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// Account holding code, e.g. a contract placed at genesis.
    pub fn with_code(code: Vec<u8>) -> Self {
        Self {
            code_hash: keccak256(&code),
            code,
            ..Self::default()
        }
    }

    /// Zero nonce, zero balance and no code.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance == 0 && self.code_hash == EMPTY_CODE_HASH
    }

    /// Merkle root over the account's storage slots.
    pub fn storage_root(&self) -> Hash {
        self.storage.iter().collect::<MerkleTree>().root()
    }
}

impl Default for Account {
    fn default() -> Self {
        Self {
            balance: 0,
            nonce: 0,
            code: Vec::new(),
            code_hash: EMPTY_CODE_HASH,
            storage: BTreeMap::new(),
        }
    }
}

/// Undo record for one mutation.
#[derive(Debug, Clone)]
enum JournalEntry {
    /// Account was created; `prev` is what it replaced.
    Create { address: Address, prev: Option<Account> },
    Balance { address: Address, prev: Wei },
    Nonce { address: Address, prev: u64 },
    Code { address: Address, prev_code: Vec<u8>, prev_hash: Hash },
    Storage { address: Address, key: Hash, prev: Hash },
    Refund { prev: u64 },
    Log { tx_hash: Hash },
}

/// Journaled in-memory world state.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    accounts: BTreeMap<Address, Account>,
    journal: Journal<JournalEntry>,
    refund: u64,
    logs: BTreeMap<Hash, Vec<Log>>,
    log_count: u32,
    tx_hash: Hash,
    tx_index: u32,
}

impl MemoryState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an account without journaling, e.g. for genesis allocation.
    pub fn insert_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    /// Look up an account.
    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// All accounts, ordered by address.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Returns true if no account exists. Not to be confused with the
    /// per-address [`StateDb::is_empty`].
    pub fn has_no_accounts(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Number of transactions whose logs are currently held.
    pub fn logged_tx_count(&self) -> usize {
        self.logs.len()
    }

    /// Number of undo entries that a revert could still replay.
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    /// Fetch an account for writing, creating it if missing.
    fn account_mut(&mut self, address: Address) -> &mut Account {
        if !self.accounts.contains_key(&address) {
            self.journal.record(JournalEntry::Create { address, prev: None });
        }
        self.accounts.entry(address).or_default()
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Create { address, prev: None } => {
                self.accounts.remove(&address);
            }
            JournalEntry::Create { address, prev: Some(account) } => {
                self.accounts.insert(address, account);
            }
            JournalEntry::Balance { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.balance = prev;
                }
            }
            JournalEntry::Nonce { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.nonce = prev;
                }
            }
            JournalEntry::Code { address, prev_code, prev_hash } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.code = prev_code;
                    account.code_hash = prev_hash;
                }
            }
            JournalEntry::Storage { address, key, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    write_slot(&mut account.storage, key, prev);
                }
            }
            JournalEntry::Refund { prev } => self.refund = prev,
            JournalEntry::Log { tx_hash } => {
                if let Some(logs) = self.logs.get_mut(&tx_hash) {
                    logs.pop();
                    if logs.is_empty() {
                        self.logs.remove(&tx_hash);
                    }
                }
                self.log_count = self.log_count.saturating_sub(1);
            }
        }
    }
}

fn write_slot(storage: &mut BTreeMap<Hash, Hash>, key: Hash, value: Hash) {
    if value == ZERO_HASH {
        storage.remove(&key);
    } else {
        storage.insert(key, value);
    }
}

impl StateDb for MemoryState {
    fn exists(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    fn is_empty(&self, address: &Address) -> bool {
        self.accounts.get(address).map_or(true, Account::is_empty)
    }

    fn create_account(&mut self, address: Address) {
        let prev = self.accounts.get(&address).cloned();
        let balance = prev.as_ref().map_or(0, |account| account.balance);
        self.journal.record(JournalEntry::Create { address, prev });
        self.accounts.insert(address, Account::with_balance(balance));
    }

    fn balance(&self, address: &Address) -> Wei {
        self.accounts.get(address).map_or(0, |account| account.balance)
    }

    fn set_balance(&mut self, address: Address, balance: Wei) {
        let prev = self.balance(&address);
        self.account_mut(address).balance = balance;
        self.journal.record(JournalEntry::Balance { address, prev });
    }

    fn nonce(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |account| account.nonce)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        let prev = self.nonce(&address);
        self.account_mut(address).nonce = nonce;
        self.journal.record(JournalEntry::Nonce { address, prev });
    }

    fn code(&self, address: &Address) -> Vec<u8> {
        self.accounts
            .get(address)
            .map(|account| account.code.clone())
            .unwrap_or_default()
    }

    fn code_hash(&self, address: &Address) -> Hash {
        self.accounts
            .get(address)
            .map_or(ZERO_HASH, |account| account.code_hash)
    }

    fn code_size(&self, address: &Address) -> usize {
        self.accounts.get(address).map_or(0, |account| account.code.len())
    }

    fn set_code(&mut self, address: Address, code: Vec<u8>) {
        let code_hash = keccak256(&code);
        let account = self.account_mut(address);
        let prev_code = std::mem::replace(&mut account.code, code);
        let prev_hash = std::mem::replace(&mut account.code_hash, code_hash);
        self.journal.record(JournalEntry::Code { address, prev_code, prev_hash });
    }

    fn storage(&self, address: &Address, key: &Hash) -> Hash {
        self.accounts
            .get(address)
            .and_then(|account| account.storage.get(key).copied())
            .unwrap_or(ZERO_HASH)
    }

    fn set_storage(&mut self, address: Address, key: Hash, value: Hash) {
        let prev = self.storage(&address, &key);
        write_slot(&mut self.account_mut(address).storage, key, value);
        self.journal.record(JournalEntry::Storage { address, key, prev });
    }

    fn add_refund(&mut self, gas: u64) {
        self.journal.record(JournalEntry::Refund { prev: self.refund });
        self.refund = self.refund.saturating_add(gas);
    }

    fn sub_refund(&mut self, gas: u64) {
        self.journal.record(JournalEntry::Refund { prev: self.refund });
        self.refund = self.refund.saturating_sub(gas);
    }

    fn refund(&self) -> u64 {
        self.refund
    }

    fn snapshot(&mut self) -> Snapshot {
        self.journal.snapshot()
    }

    fn revert_to_snapshot(&mut self, snapshot: Snapshot) {
        let Some(entries) = self.journal.revert_to(snapshot) else {
            tracing::warn!(snapshot = snapshot.id(), "revert to unknown snapshot ignored");
            return;
        };
        for entry in entries {
            self.undo(entry);
        }
    }

    fn add_log(&mut self, mut log: Log) {
        log.tx_hash = self.tx_hash;
        log.tx_index = self.tx_index;
        log.log_index = self.log_count;
        self.journal.record(JournalEntry::Log { tx_hash: self.tx_hash });
        self.logs.entry(self.tx_hash).or_default().push(log);
        self.log_count += 1;
    }

    fn logs(&self, tx_hash: &Hash) -> Vec<Log> {
        self.logs.get(tx_hash).cloned().unwrap_or_default()
    }

    fn prepare(&mut self, tx_hash: Hash, tx_index: usize) {
        self.tx_hash = tx_hash;
        self.tx_index = tx_index as u32;
        // A new block starts: earlier blocks' logs are no longer served
        if tx_index == 0 {
            self.logs.clear();
            self.log_count = 0;
        }
    }

    fn finalise(&mut self) {
        self.journal.clear();
        self.refund = 0;
    }

    fn state_root(&self) -> Hash {
        self.accounts
            .iter()
            .map(|(address, account)| {
                let leaf = encode_account_leaf(
                    account.nonce,
                    account.balance,
                    &account.code_hash,
                    &account.storage_root(),
                );
                (*address, leaf)
            })
            .collect::<MerkleTree>()
            .root()
    }
}
