use std::fmt;

/// Machine-readable error codes shared by every error type in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidType,
    InvalidRef,
    MissingPreviousHash,
    MissingField,
    NonFiniteNumber,
    DuplicateKey,
    UnresolvedBlock,
    ManualStateMissing,
    FieldConflict,
    IncomparableValues,
    UnknownStrategy,
    EmptySnapshot,
    InvalidUri,
    InvalidKey,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidType => "E1001",
            Self::InvalidRef => "E1002",
            Self::MissingPreviousHash => "E1003",
            Self::MissingField => "E1004",
            Self::NonFiniteNumber => "E2001",
            Self::DuplicateKey => "E2002",
            Self::UnresolvedBlock => "E3001",
            Self::ManualStateMissing => "E3002",
            Self::FieldConflict => "E3003",
            Self::IncomparableValues => "E3004",
            Self::UnknownStrategy => "E3005",
            Self::EmptySnapshot => "E4001",
            Self::InvalidUri => "E4002",
            Self::InvalidKey => "E4003",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidType => "Block type missing or invalid",
            Self::InvalidRef => "Malformed ref value",
            Self::MissingPreviousHash => "Update without a previous hash",
            Self::MissingField => "Required field missing",
            Self::NonFiniteNumber => "Non-finite number in block content",
            Self::DuplicateKey => "Keys collide after NFC normalization",
            Self::UnresolvedBlock => "Block could not be resolved",
            Self::ManualStateMissing => "Manual merge without a state",
            Self::FieldConflict => "Divergent field without a merge strategy",
            Self::IncomparableValues => "Numeric merge strategy on non-numeric values",
            Self::UnknownStrategy => "Unknown merge strategy",
            Self::EmptySnapshot => "Snapshot over no blocks",
            Self::InvalidUri => "Invalid block URI",
            Self::InvalidKey => "Invalid signing key",
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidType => Some("Pass a non-empty dotted type such as `substance.product`."),
            Self::InvalidRef => Some("Each ref must be a hash string or an array of hash strings."),
            Self::MissingPreviousHash => Some("Use `create` for the first version of an entity."),
            Self::NonFiniteNumber => Some("Replace NaN/Infinity with a string or omit the field."),
            Self::DuplicateKey => Some("Normalize keys to NFC before building the state."),
            Self::UnresolvedBlock => Some("Sync the missing block from a peer and retry."),
            Self::ManualStateMissing => Some("Supply the resolved state or pick a_wins/b_wins."),
            Self::FieldConflict => Some("Add a field strategy (lww, max, min) or merge manually."),
            Self::IncomparableValues => Some("Use lww for non-numeric fields."),
            Self::UnknownStrategy => Some("Use one of: manual, a_wins, b_wins, lww, max, min."),
            Self::EmptySnapshot => Some("Include at least one block in the snapshot."),
            Self::InvalidUri => Some("Use `fb:<hash>` or `fb:<type>/<alias>`."),
            Self::InvalidKey => Some("Keys are 32 bytes, hex encoded."),
            Self::MissingField => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
