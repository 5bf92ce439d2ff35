//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID, `None` for unknown ids.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Seeded `name` column value.
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Service request lifecycle status.
    RequestStatus {
        Pending = 1 => "pending",
        Offered = 2 => "offered",
        Accepted = 3 => "accepted",
        Scheduled = 4 => "scheduled",
        InProgress = 5 => "in_progress",
        Completed = 6 => "completed",
        Cancelled = 7 => "cancelled",
        Expired = 8 => "expired",
    }
}

define_status_enum! {
    /// Offer ledger resolution status.
    OfferStatus {
        Pending = 1 => "pending",
        Accepted = 2 => "accepted",
        Rejected = 3 => "rejected",
    }
}

define_status_enum! {
    /// Alternative-date proposal resolution status.
    ProposalStatus {
        Pending = 1 => "pending",
        Accepted = 2 => "accepted",
        Rejected = 3 => "rejected",
    }
}

impl RequestStatus {
    /// Completed, cancelled and expired requests accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Expired
        )
    }

    /// States from which technicians may still claim or bid on the request.
    pub fn is_open(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Offered)
    }
}

/// Map a slice of statuses to their ids for `= ANY($n)` binds.
pub fn status_ids<S: Copy + Into<StatusId>>(statuses: &[S]) -> Vec<StatusId> {
    statuses.iter().map(|s| (*s).into()).collect()
}

#[cfg(test)]
mod tests {
    use repairlink_core::negotiation::state_machine;

    use super::*;

    #[test]
    fn request_status_ids_match_seed_data() {
        assert_eq!(RequestStatus::Pending.id(), 1);
        assert_eq!(RequestStatus::Offered.id(), 2);
        assert_eq!(RequestStatus::Accepted.id(), 3);
        assert_eq!(RequestStatus::Scheduled.id(), 4);
        assert_eq!(RequestStatus::InProgress.id(), 5);
        assert_eq!(RequestStatus::Completed.id(), 6);
        assert_eq!(RequestStatus::Cancelled.id(), 7);
        assert_eq!(RequestStatus::Expired.id(), 8);
    }

    #[test]
    fn request_status_ids_match_core_state_machine() {
        assert_eq!(RequestStatus::Pending.id(), state_machine::PENDING);
        assert_eq!(RequestStatus::Scheduled.id(), state_machine::SCHEDULED);
        assert_eq!(RequestStatus::Expired.id(), state_machine::EXPIRED);
        for id in 1..=8 {
            let status = RequestStatus::from_id(id).expect("seeded id");
            assert_eq!(status.name(), state_machine::status_name(id));
            assert_eq!(status.is_terminal(), state_machine::is_terminal(id));
        }
    }

    #[test]
    fn unknown_ids_do_not_resolve() {
        assert_eq!(RequestStatus::from_id(0), None);
        assert_eq!(OfferStatus::from_id(4), None);
        assert_eq!(ProposalStatus::from_id(-1), None);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = OfferStatus::Rejected.into();
        assert_eq!(id, 3);
    }

    #[test]
    fn status_ids_preserves_order() {
        let ids = status_ids(&[RequestStatus::Offered, RequestStatus::Pending]);
        assert_eq!(ids, vec![2, 1]);
    }
}
