use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Whether text is travelling from the user into the system or from the
/// generator back out to the user. Classifier sources apply per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSource {
    Lexical,
    Moderation,
    Judgment,
}

impl RiskSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Moderation => "moderation",
            Self::Judgment => "judgment",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "lexical" => Some(Self::Lexical),
            "moderation" => Some(Self::Moderation),
            "judgment" => Some(Self::Judgment),
            _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskSeverity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Crisis taxonomy used by the lexical matcher and the fixed crisis
/// responses. Codes follow the review team's shorthand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisCategory {
    SuicidalIdeation,
    SelfHarm,
    HarmToOthers,
    Abuse,
}

impl CrisisCategory {
    pub const fn code(self) -> &'static str {
        match self {
            Self::SuicidalIdeation => "SI",
            Self::SelfHarm => "SH",
            Self::HarmToOthers => "HI",
            Self::Abuse => "EA",
        }
    }
}

/// Combined safety outcome for one piece of text. `Blocked` always wins
/// over `Flagged`, which wins over `Clear`; combination never lowers
/// severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskVerdict {
    Clear,
    Flagged {
        reason: String,
        severity: RiskSeverity,
        source: RiskSource,
    },
    Blocked {
        reason: String,
        source: RiskSource,
    },
}

impl RiskVerdict {
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Clear => 0,
            Self::Flagged { .. } => 1,
            Self::Blocked { .. } => 2,
        }
    }

    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    pub const fn is_clear(&self) -> bool {
        matches!(self, Self::Clear)
    }

    pub fn source(&self) -> Option<RiskSource> {
        match self {
            Self::Clear => None,
            Self::Flagged { source, .. } | Self::Blocked { source, .. } => Some(*source),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Clear => None,
            Self::Flagged { reason, .. } | Self::Blocked { reason, .. } => Some(reason),
        }
    }

    /// Worst-case combination. Input order encodes source priority: among
    /// verdicts of equal rank the earliest one supplies the reported
    /// reason, so callers pass lexical before moderation before judgment.
    pub fn combine(verdicts: impl IntoIterator<Item = RiskVerdict>) -> RiskVerdict {
        let mut combined = RiskVerdict::Clear;
        for verdict in verdicts {
            if verdict.rank() > combined.rank() {
                combined = verdict;
            }
        }
        combined
    }
}

/// One user message paired with the final assistant response. Immutable
/// once recorded; the idempotency key makes at-least-once redelivery safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub conversation_id: Uuid,
    pub idempotency_key: String,
    pub recorded_at: DateTime<Utc>,
    /// Civil date in the reference timezone, not the host timezone.
    pub civil_date: NaiveDate,
    pub user_text: String,
    pub assistant_text: String,
    pub verdict: RiskVerdict,
    pub fired_sources: Vec<RiskSource>,
}

/// Deterministic turn identity derived from the caller-supplied message id,
/// so a retried delivery of the same message maps to the same stored turn.
pub fn turn_idempotency_key(conversation_id: Uuid, client_message_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(conversation_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(client_message_id.as_bytes());

    let digest = hasher.finalize();
    format!("turn:{}", URL_SAFE_NO_PAD.encode(digest))
}

/// Distilled cross-day memory record, unique per (conversation, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub conversation_id: Uuid,
    pub summary_date: NaiveDate,
    pub main_concerns: Option<String>,
    pub emotional_patterns: Option<String>,
    pub coping_strategies: Option<String>,
    pub progress_notes: Option<String>,
    pub important_context: Option<String>,
    pub source_turn_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Append-only escalation record handed to the review collaborator for
/// every non-clear verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub conversation_id: Uuid,
    pub direction: Direction,
    pub source: RiskSource,
    pub reason: String,
    pub severity: Option<RiskSeverity>,
    pub excerpt: String,
    pub observed_at: DateTime<Utc>,
}
