use serde::{Deserialize, Serialize};

use super::error::ChainStateError;

/// Previous invoice hash of the very first invoice an EGS unit issues:
/// base64 of the hex SHA-256 digest of the string `"0"`.
pub const GENESIS_PREVIOUS_INVOICE_HASH: &str =
    "NWZlY2ViNjZmZmM4NmYzOGQ5NTI3ODZjNmQ2OTZjNzljMmRiYzIzOWRkNGU5MWI0NjcyOWQ3M2EyN2ZiNTdlOQ==";

/// Counter and previous hash the next invoice must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    /// Invoice counter value (ICV).
    pub counter: u64,
    /// Previous invoice hash (PIH).
    pub previous_invoice_hash: String,
}

/// One issued invoice as seen by the hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashChainLink {
    pub counter: u64,
    pub previous_invoice_hash: String,
    /// Hash computed over the invoice itself.
    pub invoice_hash: String,
}

/// Append-only hash chain of one EGS unit.
///
/// Counters start at 1 and never repeat or skip. Each invoice must carry the
/// hash of its predecessor; the first carries [`GENESIS_PREVIOUS_INVOICE_HASH`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceChain {
    next_counter: u64,
    last_hash: String,
}

impl Default for InvoiceChain {
    fn default() -> Self {
        Self::genesis()
    }
}

impl InvoiceChain {
    /// A chain with no invoices issued yet.
    pub fn genesis() -> Self {
        Self {
            next_counter: 1,
            last_hash: GENESIS_PREVIOUS_INVOICE_HASH.to_string(),
        }
    }

    /// Continue a chain after `last_counter` whose invoice hashed to `last_hash`.
    pub fn resume(last_counter: u64, last_hash: impl Into<String>) -> Self {
        Self {
            next_counter: last_counter + 1,
            last_hash: last_hash.into(),
        }
    }

    /// Link for the next invoice without consuming it.
    pub fn next_link(&self) -> ChainLink {
        ChainLink {
            counter: self.next_counter,
            previous_invoice_hash: self.last_hash.clone(),
        }
    }

    /// Record an issued invoice. The link must be the one [`next_link`](Self::next_link)
    /// returns; anything else would fork the chain.
    pub fn record(
        &mut self,
        link: &ChainLink,
        invoice_hash: impl Into<String>,
    ) -> Result<HashChainLink, ChainStateError> {
        if link.counter != self.next_counter {
            return Err(ChainStateError::CounterOutOfSequence {
                expected: self.next_counter,
                got: link.counter,
            });
        }
        if link.previous_invoice_hash != self.last_hash {
            return Err(ChainStateError::PreviousHashMismatch {
                counter: link.counter,
                expected: self.last_hash.clone(),
                found: link.previous_invoice_hash.clone(),
            });
        }

        let invoice_hash = invoice_hash.into();
        self.next_counter += 1;
        self.last_hash = invoice_hash.clone();
        Ok(HashChainLink {
            counter: link.counter,
            previous_invoice_hash: link.previous_invoice_hash.clone(),
            invoice_hash,
        })
    }

    /// Hash of the last recorded invoice (or the genesis value).
    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }

    /// Counter the next invoice will get.
    pub fn next_counter(&self) -> u64 {
        self.next_counter
    }
}

/// Check that consecutive links increase their counter by one and reference
/// the previous link's hash. The first link is taken as given.
pub fn verify_chain(links: &[HashChainLink]) -> Result<(), ChainStateError> {
    for pair in links.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if cur.counter != prev.counter + 1 {
            return Err(ChainStateError::CounterOutOfSequence {
                expected: prev.counter + 1,
                got: cur.counter,
            });
        }
        if cur.previous_invoice_hash != prev.invoice_hash {
            return Err(ChainStateError::PreviousHashMismatch {
                counter: cur.counter,
                expected: prev.invoice_hash.clone(),
                found: cur.previous_invoice_hash.clone(),
            });
        }
    }
    Ok(())
}
