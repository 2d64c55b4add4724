use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::catalog::CatalogInstrument;

/// The identity a pipeline needs to fetch and file one instrument.
///
/// All fields are lowercased; the catalog keeps the original casing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub mnemonic: String,
    pub mep: String,
    pub mic: String,
    pub isin: String,
    pub kind: String,
}

impl Instrument {
    pub fn from_catalog(entry: &CatalogInstrument) -> Self {
        Self {
            mnemonic: entry.symbol.to_lowercase(),
            mep: entry.mep.to_lowercase(),
            mic: entry.mic.to_lowercase(),
            isin: entry.isin.to_lowercase(),
            kind: entry.kind.to_lowercase(),
        }
    }

    /// Mnemonic safe to use as a directory name on Windows shares.
    pub fn safe_mnemonic(&self) -> String {
        let mnemonic = self.mnemonic.clone();
        if matches!(mnemonic.as_str(), "prn" | "com" | "lpt" | "aux") {
            mnemonic + "_"
        } else {
            mnemonic
        }
    }

    /// Per-instrument folder below the downloads/repository roots.
    pub fn folder(&self) -> PathBuf {
        PathBuf::from(&self.mic)
            .join(&self.kind)
            .join(self.safe_mnemonic())
    }

    /// Base of every file belonging to this instrument.
    pub fn base_name(&self) -> String {
        format!("{}_{}_{}", self.mnemonic, self.isin, self.mic)
    }

    /// The venue's product page, used as the Referer on downloads.
    pub fn quotes_page(&self) -> String {
        let segment = match self.kind.as_str() {
            "index" | "inav" => "indices",
            "etv" => "etvs",
            "etf" => "etfs",
            "fund" => "funds",
            _ => "equities",
        };

        format!(
            "https://live.euronext.com/en/product/{}/{}-{}/quotes",
            segment,
            self.isin.to_uppercase(),
            self.mic.to_uppercase()
        )
    }

    /// Progress label for log lines: `(12 of 3456) cla_fr0013426004_xpar`.
    pub fn progress_label(&self, index: usize, total: usize) -> String {
        format!("({} of {}) {}", index + 1, total, self.base_name())
    }
}
