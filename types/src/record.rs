use thiserror::Error;

use super::PeriodId;

/// Which ledger a record's actor belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorKind {
    Member,
    Agent,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Member => "member",
            ActorKind::Agent => "agent",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown record kind {value:?}")]
pub struct RecordKindParseError {
    pub value: String,
}

/// Balance-mutation categories the settlement core writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Win,
    Rebate,
    Correction,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Win => "win",
            RecordKind::Rebate => "rebate",
            RecordKind::Correction => "correction",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RecordKindParseError> {
        match value {
            "win" => Ok(RecordKind::Win),
            "rebate" => Ok(RecordKind::Rebate),
            "correction" => Ok(RecordKind::Correction),
            other => Err(RecordKindParseError {
                value: other.to_string(),
            }),
        }
    }
}

/// An immutable audit entry for one balance mutation.
///
/// Write-once, never updated or deleted. Every balance change the core makes
/// commits in the same transaction as exactly one of these rows. The rebate
/// rows, keyed by the canonical period text, are the sole source of truth for
/// "has this period already been rebated"; `member_id` ties a rebate credit
/// back to the member whose stake generated it, making the exactly-once guard
/// structural instead of description parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Row id; zero until inserted.
    pub id: i64,
    pub actor: ActorKind,
    pub actor_id: i64,
    pub kind: RecordKind,
    pub amount_cents: i64,
    pub balance_before_cents: i64,
    pub balance_after_cents: i64,
    pub period: Option<PeriodId>,
    pub member_id: Option<i64>,
    pub description: String,
    pub created_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_round_trip() {
        for kind in [RecordKind::Win, RecordKind::Rebate, RecordKind::Correction] {
            assert_eq!(RecordKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(RecordKind::parse("bonus").is_err());
    }
}
