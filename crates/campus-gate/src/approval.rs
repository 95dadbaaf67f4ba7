//! Administrator approval of staff accounts
//!
//! The approval flag moves false -> true exactly once and only at the hands
//! of an approved admin.

use crate::collaborators::ProfileStore;
use crate::error::ApprovalError;
use crate::types::{Role, SessionProfile, Uid};

/// Approve `target` on behalf of `approver`
///
/// # Errors
/// - `NotAuthorized` unless the approver is an approved admin
/// - `TargetNotFound` if the target has no profile
/// - `AlreadyApproved` if the target was approved before
pub async fn approve(
    store: &dyn ProfileStore,
    approver: &SessionProfile,
    target: &Uid,
) -> Result<SessionProfile, ApprovalError> {
    if !can_approve(approver) {
        return Err(ApprovalError::NotAuthorized(approver.uid.clone()));
    }

    let profile = store
        .fetch(target)
        .await?
        .ok_or_else(|| ApprovalError::TargetNotFound(target.clone()))?;

    if profile.approved {
        return Err(ApprovalError::AlreadyApproved(target.clone()));
    }

    let approved = store.set_approved(target).await?;
    tracing::info!(approver = %approver.uid, target = %target, role = %approved.role, "account approved");
    Ok(approved)
}

/// Whether a profile may approve other accounts
#[inline]
#[must_use]
pub fn can_approve(profile: &SessionProfile) -> bool {
    profile.approved && profile.role.known() == Some(Role::Admin)
}

/// Staff accounts waiting for approval, newest first
#[must_use]
pub fn pending_approvals<I>(profiles: I) -> Vec<SessionProfile>
where
    I: IntoIterator<Item = SessionProfile>,
{
    let mut pending: Vec<_> = profiles
        .into_iter()
        .filter(|p| !p.approved && p.role.is_one_of(&[Role::Teacher, Role::Admin]))
        .collect();
    pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    pending
}
