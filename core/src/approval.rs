//! Approval chains shared by daily tasks and behavioral evaluations.
//!
//! A chain is resolved once, at submission, from a fixed template against
//! the roster. The record-level status is never stored on its own: every
//! mutation goes through `ApprovalChain::decide`, which re-derives it.

use crate::{
    error::{PmsError, PmsResult},
    position::Position,
    types::StaffId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    /// Declared for compatibility with older records; nothing produces it.
    #[serde(rename = "Requested Edit")]
    RequestedEdit,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::RequestedEdit => "Requested Edit",
        }
    }

    pub fn parse(raw: &str) -> PmsResult<Self> {
        match raw {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            "Requested Edit" => Ok(Self::RequestedEdit),
            other => Err(PmsError::validation(format!("unknown approval status '{other}'"))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    pub approver_id: StaffId,
    pub role: Position,
    pub status: ApprovalStatus,
    pub decided_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalChain {
    pub entries: Vec<ApprovalEntry>,
}

/// Task-level status as a pure function of the entry statuses.
///
/// Rejected if any entry is Rejected, Approved if every entry is Approved,
/// Pending otherwise (including the empty chain).
pub fn derive_status(entries: &[ApprovalEntry]) -> ApprovalStatus {
    if entries.iter().any(|e| e.status == ApprovalStatus::Rejected) {
        ApprovalStatus::Rejected
    } else if !entries.is_empty() && entries.iter().all(|e| e.status == ApprovalStatus::Approved) {
        ApprovalStatus::Approved
    } else {
        ApprovalStatus::Pending
    }
}

impl ApprovalChain {
    pub fn from_approvers(approvers: Vec<(StaffId, Position)>) -> Self {
        Self {
            entries: approvers
                .into_iter()
                .map(|(approver_id, role)| ApprovalEntry {
                    approver_id,
                    role,
                    status: ApprovalStatus::Pending,
                    decided_at: None,
                    comments: None,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn status(&self) -> ApprovalStatus {
        derive_status(&self.entries)
    }

    pub fn has_pending_entry_for(&self, staff_id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.approver_id == staff_id && e.status == ApprovalStatus::Pending)
    }

    /// Record `approver_id`'s decision on their pending entry and return the
    /// re-derived status.
    pub fn decide(
        &mut self,
        approver_id: &str,
        decision: Decision,
        comments: Option<String>,
        at: DateTime<Utc>,
    ) -> PmsResult<ApprovalStatus> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.approver_id == approver_id && e.status == ApprovalStatus::Pending)
            .ok_or_else(|| PmsError::unauthorized(approver_id, "act on this approval chain"))?;
        entry.status = match decision {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject => ApprovalStatus::Rejected,
        };
        entry.decided_at = Some(at);
        entry.comments = comments;
        Ok(self.status())
    }
}

/// Fixed approval templates, keyed by the submitter's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalTemplate {
    /// Frontline officers: accountant, then MSM, then branch manager.
    MsoChain,
    /// Accountants: MSM, then branch manager.
    AccountantChain,
    /// Evaluations written by a sub-team leader or MSM.
    BranchManagerSignOff,
    /// Evaluations written by a branch manager.
    AreaManagerSignOff,
    None,
}

impl ApprovalTemplate {
    pub fn for_task_submitter(position: Position) -> Self {
        if position.is_mso() {
            Self::MsoChain
        } else if position == Position::Accountant {
            Self::AccountantChain
        } else {
            Self::None
        }
    }

    pub fn for_evaluator(position: Position) -> Self {
        match position {
            Position::SubTeamLeader | Position::Msm => Self::BranchManagerSignOff,
            Position::BranchManager => Self::AreaManagerSignOff,
            _ => Self::None,
        }
    }

    /// Required approver positions, in order.
    pub fn steps(&self) -> &'static [Position] {
        match self {
            Self::MsoChain => &[Position::Accountant, Position::Msm, Position::BranchManager],
            Self::AccountantChain => &[Position::Msm, Position::BranchManager],
            Self::BranchManagerSignOff => &[Position::BranchManager],
            Self::AreaManagerSignOff => &[Position::AreaManager],
            Self::None => &[],
        }
    }

    /// Resolve the template against the roster. `lookup` returns the staff
    /// member holding a position, if any; absent approvers are omitted.
    pub fn resolve<F>(&self, mut lookup: F) -> PmsResult<ApprovalChain>
    where
        F: FnMut(Position) -> PmsResult<Option<StaffId>>,
    {
        let mut approvers = Vec::new();
        for &position in self.steps() {
            if let Some(staff_id) = lookup(position)? {
                approvers.push((staff_id, position));
            }
        }
        Ok(ApprovalChain::from_approvers(approvers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> ApprovalChain {
        ApprovalChain::from_approvers(
            (0..n).map(|i| (format!("a{i}"), Position::Accountant)).collect(),
        )
    }

    #[test]
    fn empty_chain_is_pending() {
        assert_eq!(derive_status(&[]), ApprovalStatus::Pending);
    }

    #[test]
    fn approval_order_does_not_matter() {
        let now = Utc::now();
        let mut forward = chain(2);
        forward.decide("a0", Decision::Approve, None, now).unwrap();
        assert_eq!(forward.status(), ApprovalStatus::Pending);
        forward.decide("a1", Decision::Approve, None, now).unwrap();

        let mut backward = chain(2);
        backward.decide("a1", Decision::Approve, None, now).unwrap();
        backward.decide("a0", Decision::Approve, None, now).unwrap();

        assert_eq!(forward.status(), ApprovalStatus::Approved);
        assert_eq!(backward.status(), ApprovalStatus::Approved);
    }

    #[test]
    fn any_rejection_wins_regardless_of_order() {
        let now = Utc::now();
        let mut a = chain(2);
        a.decide("a0", Decision::Approve, None, now).unwrap();
        a.decide("a1", Decision::Reject, None, now).unwrap();

        let mut b = chain(2);
        b.decide("a1", Decision::Reject, None, now).unwrap();
        b.decide("a0", Decision::Approve, None, now).unwrap();

        assert_eq!(a.status(), ApprovalStatus::Rejected);
        assert_eq!(b.status(), ApprovalStatus::Rejected);
    }

    #[test]
    fn only_pending_entries_can_be_decided() {
        let now = Utc::now();
        let mut c = chain(1);
        c.decide("a0", Decision::Approve, None, now).unwrap();
        assert!(c.decide("a0", Decision::Reject, None, now).is_err());
        assert!(c.decide("stranger", Decision::Approve, None, now).is_err());
        assert_eq!(c.status(), ApprovalStatus::Approved);
    }

    #[test]
    fn absent_approvers_are_omitted() {
        let chain = ApprovalTemplate::MsoChain
            .resolve(|p| Ok((p != Position::Msm).then(|| p.code().to_string())))
            .unwrap();
        let roles: Vec<_> = chain.entries.iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Position::Accountant, Position::BranchManager]);
    }

    #[test]
    fn templates_by_position() {
        assert_eq!(ApprovalTemplate::for_task_submitter(Position::MsoIII), ApprovalTemplate::MsoChain);
        assert_eq!(ApprovalTemplate::for_task_submitter(Position::Accountant), ApprovalTemplate::AccountantChain);
        assert_eq!(ApprovalTemplate::for_task_submitter(Position::BranchManager), ApprovalTemplate::None);
        assert_eq!(ApprovalTemplate::for_evaluator(Position::SubTeamLeader), ApprovalTemplate::BranchManagerSignOff);
        assert_eq!(ApprovalTemplate::for_evaluator(Position::BranchManager), ApprovalTemplate::AreaManagerSignOff);
    }
}
