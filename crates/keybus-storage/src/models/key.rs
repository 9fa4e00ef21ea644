use crate::error::StorageResult;
use chrono::{DateTime, Utc};
use keybus_core::{CellIndex, KeyCode};
use serde::{Deserialize, Serialize};

/// One key cell of a room's controller, as persisted.
///
/// Every controller cell has a row; an empty cell has `key_code = NULL`.
/// `removed_at` keeps the time of the last revocation for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeyRecord {
    pub id: i64,
    pub room_id: i64,
    pub cell_index: i64,

    /// Uppercase hex of the 5-byte code.
    pub key_code: Option<String>,

    pub holder_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    /// Decoded key code; `None` for an empty cell.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the stored hex is malformed.
    pub fn code(&self) -> StorageResult<Option<KeyCode>> {
        match &self.key_code {
            Some(hex) => Ok(Some(KeyCode::from_hex(hex)?)),
            None => Ok(None),
        }
    }

    /// Whether the cell holds a key whose expiry is earlier than `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.key_code.is_some() && self.expires_at.is_some_and(|at| at < now)
    }
}

/// A key being placed into a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAssignment {
    pub cell: CellIndex,
    pub code: KeyCode,
    pub holder_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl KeyAssignment {
    pub fn new(cell: CellIndex, code: KeyCode, holder_name: impl Into<String>) -> Self {
        Self {
            cell,
            code,
            holder_name: holder_name.into(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn record(code: Option<&str>, expires_at: Option<DateTime<Utc>>) -> KeyRecord {
        KeyRecord {
            id: 1,
            room_id: 1,
            cell_index: 0,
            key_code: code.map(str::to_string),
            holder_name: None,
            created_at: None,
            expires_at,
            removed_at: None,
        }
    }

    #[test]
    fn code_decodes_hex() {
        let r = record(Some("0102030405"), None);
        assert_eq!(r.code().unwrap(), Some(KeyCode::new([1, 2, 3, 4, 5])));
        assert_eq!(record(None, None).code().unwrap(), None);
        assert!(record(Some("zz"), None).code().is_err());
    }

    #[rstest]
    #[case(Some("0102030405"), Some(-1), true)]
    #[case(Some("0102030405"), Some(0), false)]
    #[case(Some("0102030405"), Some(1), false)]
    #[case(None, Some(-1), false)]
    #[case(Some("0102030405"), None, false)]
    fn expiry_requires_a_key(
        #[case] code: Option<&str>,
        #[case] offset_minutes: Option<i64>,
        #[case] expired: bool,
    ) {
        let now = Utc::now();
        let expires_at = offset_minutes.map(|m| now + Duration::minutes(m));
        assert_eq!(record(code, expires_at).is_expired(now), expired);
    }
}
