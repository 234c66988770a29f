use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CoreError;

macro_rules! string_enum {
    ($name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Result<Self, CoreError> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(CoreError::InvalidData(format!(concat!("unknown ", $label, ": {}"), s))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(TargetType, "target type" {
    Tag => "tag",
    Performer => "performer",
    Studio => "studio",
    Scene => "scene",
});

string_enum!(Operation, "operation" {
    Create => "create",
    Modify => "modify",
    Destroy => "destroy",
    Merge => "merge",
});

string_enum!(EditStatus, "edit status" {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
    ImmediateAccepted => "immediate_accepted",
    ImmediateRejected => "immediate_rejected",
    Canceled => "canceled",
    Failed => "failed",
});

string_enum!(VoteType, "vote" {
    Accept => "accept",
    Reject => "reject",
    Abstain => "abstain",
    ImmediateAccept => "immediate_accept",
    ImmediateReject => "immediate_reject",
});

string_enum!(Role, "role" {
    Read => "read",
    Vote => "vote",
    Edit => "edit",
    EditTags => "edit_tags",
    Bot => "bot",
    ReadOnly => "read_only",
    Admin => "admin",
});

impl Operation {
    /// Operations that need an existing target entity.
    pub fn requires_target(&self) -> bool {
        !matches!(self, Operation::Create)
    }
}

impl EditStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, EditStatus::Pending)
    }

    /// Statuses that mean the edit's changes reached the target entity.
    pub fn is_applied(&self) -> bool {
        matches!(self, EditStatus::Accepted | EditStatus::ImmediateAccepted)
    }
}

impl VoteType {
    /// Votes a reviewer may cast directly; the `immediate_*` markers are
    /// reserved for administrative resolution.
    pub fn is_ballot(&self) -> bool {
        matches!(self, VoteType::Accept | VoteType::Reject | VoteType::Abstain)
    }
}

impl Role {
    pub fn implies(&self, required: Role) -> bool {
        if *self == required {
            return true;
        }
        match self {
            Role::Admin => true,
            Role::Edit | Role::Vote | Role::EditTags | Role::Bot => required == Role::Read,
            Role::Read | Role::ReadOnly => false,
        }
    }
}

/// True when any of `roles` grants `required`.
pub fn has_role(roles: &[Role], required: Role) -> bool {
    roles.iter().any(|r| r.implies(required))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_round_trip_through_text() {
        for status in EditStatus::ALL {
            assert_eq!(EditStatus::parse(status.as_str()).unwrap(), *status);
        }
        assert!(EditStatus::parse("approved").is_err());
    }

    #[test]
    fn admin_implies_everything() {
        for role in Role::ALL {
            assert!(Role::Admin.implies(*role));
        }
    }

    #[test]
    fn edit_implies_vote_but_not_admin() {
        assert!(!Role::Edit.implies(Role::Vote));
        assert!(Role::Edit.implies(Role::Read));
        assert!(!Role::Edit.implies(Role::Admin));
        assert!(!Role::Vote.implies(Role::Edit));
        assert!(!Role::ReadOnly.implies(Role::Read));
    }

    #[test]
    fn only_applied_statuses_report_applied() {
        let applied: Vec<_> = EditStatus::ALL.iter().filter(|s| s.is_applied()).collect();
        assert_eq!(applied, vec![&EditStatus::Accepted, &EditStatus::ImmediateAccepted]);
    }

    #[test]
    fn immediate_votes_are_not_ballots() {
        assert!(VoteType::Reject.is_ballot());
        assert!(!VoteType::ImmediateAccept.is_ballot());
    }
}
