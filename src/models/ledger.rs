//! On-store shape of the ledger document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The single JSON object kept under the reserved meta identity.
///
/// ```json
/// {
///   "date_encryption": { "20300616000000": "<bucket key>" },
///   "name_dates": { "service|username": "20300616000000" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDocument {
    /// Canonical timestamp -> bucket encryption key.
    #[serde(default)]
    pub date_encryption: BTreeMap<String, String>,
    /// `"<service>|<username>"` -> canonical timestamp.
    #[serde(default)]
    pub name_dates: BTreeMap<String, String>,
}

impl LedgerDocument {
    pub fn is_empty(&self) -> bool {
        self.date_encryption.is_empty() && self.name_dates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let mut doc = LedgerDocument::default();
        doc.date_encryption
            .insert("20300616000000".into(), "k".into());
        doc.name_dates
            .insert("svc|user".into(), "20300616000000".into());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["date_encryption"]["20300616000000"], "k");
        assert_eq!(json["name_dates"]["svc|user"], "20300616000000");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let doc: LedgerDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.is_empty());
    }
}
