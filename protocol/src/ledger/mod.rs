//! # Ledger State — Authoritative Custody Records
//!
//! The data half of the custody core. Every figure the invariant engine
//! gates on — backing, minted, caps, status, wallet bindings — lives in
//! these records, and nothing mutates them except the engine.
//!
//! ```text
//! reserve.rs — Reserve record, 5-state status model, pause credit
//! wallet.rs  — Reserve wallets, obligation tracking, address validation
//! store.rs   — Owned keyed store with the global minted aggregate
//! ```

pub mod reserve;
pub mod store;
pub mod wallet;

pub use reserve::{EscalationTimer, PauseCredit, Reserve, ReserveId, ReserveStatus};
pub use store::{LedgerError, LedgerStore};
pub use wallet::{validate_btc_address, BtcAddressError, Wallet, WalletStatus};
