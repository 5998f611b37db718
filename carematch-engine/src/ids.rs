//! Identifier newtypes for durable entities

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from string
            pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an open shift
    ShiftId
);
uuid_id!(
    /// Unique identifier for an assignment proposal
    ProposalId
);
uuid_id!(
    /// Unique identifier for a caregiver
    CaregiverId
);
uuid_id!(
    /// Unique identifier for a client receiving care
    ClientId
);
uuid_id!(
    /// Unique identifier for an organization
    OrganizationId
);
uuid_id!(
    /// Unique identifier for a branch within an organization
    BranchId
);
uuid_id!(
    /// Unique identifier for a matching configuration
    ConfigId
);
uuid_id!(
    /// Unique identifier for a bulk match job
    BulkMatchId
);
uuid_id!(
    /// Unique identifier for an A/B experiment
    ExperimentId
);
