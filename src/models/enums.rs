use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Category {
    SoftwareLicense => "SOFTWARE_LICENSE",
    PlnUpgrade => "PLN_UPGRADE",
    DismantleDrop => "DISMANTLE_DROP",
    DismantleKeep => "DISMANTLE_KEEP",
    RanMw => "RAN_MW",
    Unknown => "UNKNOWN",
});

str_enum!(Role {
    FopRts => "FOP_RTS",
    RegionTeam => "REGION_TEAM",
    Rth => "RTH",
    Roh => "ROH",
    Pmo => "PMO",
    Bo => "BO",
    Sme => "SME",
    HeadNoc => "HEAD_NOC",
    Admin => "ADMIN",
});

str_enum!(StageCode {
    FopRtsReview => "FOP_RTS_REVIEW",
    RegionReview => "REGION_REVIEW",
    RthReview => "RTH_REVIEW",
    RohReview => "ROH_REVIEW",
    PmoReview => "PMO_REVIEW",
    BoReview => "BO_REVIEW",
    SmeReview => "SME_REVIEW",
    HeadNocReview => "HEAD_NOC_REVIEW",
});

str_enum!(StageStatus {
    Waiting => "waiting",
    Pending => "pending",
    Completed => "completed",
});

str_enum!(DocumentStatus {
    InReview => "in_review",
    Approved => "approved",
    PunchlistRectification => "punchlist_rectification",
});

// Variant order is the escalation ranking: None < Minor < Major < Critical.
str_enum!(PunchlistSeverity {
    None => "none",
    Minor => "minor",
    Major => "major",
    Critical => "critical",
});

str_enum!(PunchlistStatus {
    Open => "open",
    Resolved => "resolved",
});

str_enum!(StageEventKind {
    Submitted => "submitted",
    StageCompleted => "stage_completed",
    StageActivated => "stage_activated",
    RectificationRequired => "rectification_required",
    Approved => "approved",
    PunchlistResolved => "punchlist_resolved",
    Resubmitted => "resubmitted",
    AdministrativeOverride => "administrative_override",
});

impl Category {
    /// Resolve a caller-supplied category hint, accepting the legacy
    /// `software` / `hardware` / `both` aliases.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let normalized = hint.trim().to_uppercase();
        match normalized.as_str() {
            "SOFTWARE" => Some(Self::SoftwareLicense),
            "HARDWARE" | "BOTH" => Some(Self::RanMw),
            other => other.parse().ok(),
        }
    }
}

impl Role {
    /// Parse an acting role supplied by the role resolver (case-insensitive).
    pub fn parse_acting(raw: &str) -> Option<Self> {
        raw.trim().to_uppercase().parse().ok()
    }
}

impl StageCode {
    /// Human-readable stage name shown in status views.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::FopRtsReview => "FOP/RTS Field Review",
            Self::RegionReview => "Region Team Review",
            Self::RthReview => "RTH Final Approval",
            Self::RohReview => "ROH Review",
            Self::PmoReview => "PMO Final Approval",
            Self::BoReview => "Business Operations Review",
            Self::SmeReview => "SME Technical Review",
            Self::HeadNocReview => "Head NOC Final Review",
        }
    }

    /// The only role allowed to decide this stage.
    pub fn required_role(&self) -> Role {
        match self {
            Self::FopRtsReview => Role::FopRts,
            Self::RegionReview => Role::RegionTeam,
            Self::RthReview => Role::Rth,
            Self::RohReview => Role::Roh,
            Self::PmoReview => Role::Pmo,
            Self::BoReview => Role::Bo,
            Self::SmeReview => Role::Sme,
            Self::HeadNocReview => Role::HeadNoc,
        }
    }
}

impl PunchlistSeverity {
    /// Parse a punchlist item severity from reviewer input (case-insensitive).
    /// `none` is not a valid item severity; it only exists as an evaluation result.
    pub fn parse_item(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().parse() {
            Ok(Self::None) | Err(_) => None,
            Ok(severity) => Some(severity),
        }
    }
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::PunchlistRectification)
    }
}

/// A reviewer decision.
///
/// Unrecognized values are kept verbatim and route to rectification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    ApproveWithPunchlist,
    Reject,
    Unrecognized(String),
}

impl Decision {
    /// Parse a decision string. Returns `None` only for empty input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(match trimmed.to_lowercase().as_str() {
            "approve" => Self::Approve,
            "approve_with_punchlist" | "approve_with_pl" => Self::ApproveWithPunchlist,
            "reject" => Self::Reject,
            _ => Self::Unrecognized(trimmed.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Approve => "approve",
            Self::ApproveWithPunchlist => "approve_with_punchlist",
            Self::Reject => "reject",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn is_approval(&self) -> bool {
        matches!(self, Self::Approve | Self::ApproveWithPunchlist)
    }
}

impl Serialize for Decision {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
