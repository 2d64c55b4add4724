//! Intraday trade feed: the JSON payload behind the venue's price tape.

use serde::{Deserialize, Deserializer, Serialize};

/// The feed sometimes sends trade ids as numbers and sometimes as strings;
/// anything else reads as `"?"`.
fn trade_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => "?".to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    #[serde(rename = "tradeId", deserialize_with = "trade_id", default)]
    pub trade_id: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub volume: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// One day's trade tape for one instrument. Only the fields the pipeline
/// uses are kept; the raw payload is archived verbatim anyway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntradaySession {
    #[serde(default)]
    pub rows: Vec<Trade>,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub startdate: String,
}

/// Condense the feed's verbose trade-type labels to three-letter codes.
pub fn trade_label(label: &str) -> &'static str {
    match label.to_lowercase().as_str() {
        "official opening index" => "OOI",
        "real-time index" => "RTI",
        "automatic indicative index" => "AII",
        "options liquidation index" => "OLI",
        "closing reference index" => "CRI",
        "preliminary reference index" => "PRI",
        "confirmed reference index" => "FRI",
        "exchange continuous" => "ECO",
        "auction" => "AUC",
        "valuation trade" => "VAL",
        "retail matching facility" => "RMF",
        "offbook out of market" => "OBM",
        "offbook investment funds" => "OBF",
        "offbook on exchange" => "OBE",
        "trading at last" => "TAL",
        "trade cancellation" => "TCA",
        "dark trade" => "DKT",
        "request for quote" => "RFQ",
        "opening" => "OPN",
        "exchange cross" => "ECR",
        _ => "UNK",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_id_accepts_strings_and_numbers() {
        let json = r#"{"rows": [
            {"tradeId": "123", "time": "09:00:01", "price": "10.5", "volume": "100", "type": "Exchange Continuous"},
            {"tradeId": 456, "time": "09:00:02", "price": "10.6", "volume": "50", "type": "Auction"},
            {"tradeId": null, "time": "09:00:03", "price": "10.7", "volume": "25", "type": ""}
        ], "count": 3, "date": "2024-06-03"}"#;

        let session: IntradaySession = serde_json::from_str(json).unwrap();
        assert_eq!(session.rows[0].trade_id, "123");
        assert_eq!(session.rows[1].trade_id, "456");
        assert_eq!(session.rows[2].trade_id, "?");
        assert_eq!(session.count, 3);
    }

    #[test]
    fn test_unknown_metadata_is_ignored() {
        let json = r#"{"rows": [], "count": 0, "date": "", "timeZone": "CET",
            "sliderFilters": {"Price": {"min": "1"}}}"#;
        let session: IntradaySession = serde_json::from_str(json).unwrap();
        assert!(session.rows.is_empty());
    }

    #[test]
    fn test_trade_labels() {
        assert_eq!(trade_label("Exchange Continuous"), "ECO");
        assert_eq!(trade_label("AUCTION"), "AUC");
        assert_eq!(trade_label(""), "UNK");
        assert_eq!(trade_label("whatever else"), "UNK");
    }
}
