//! Permissions over a case's supplementary-demand ("claim") rows.
//!
//! Claims live as loosely-typed table rows; what the requesting side may
//! do with the form depends on the statuses present across all rows.

use std::collections::BTreeSet;

use docket_core::labels;

/// What the claim form currently permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClaimPermission {
    Read,
    Write,
}

/// Fold the claim rows of a case into the permission set.
///
/// Any row past `draft` grants read; any row `in-progress` additionally
/// grants write. Rows without a string `status` field contribute
/// nothing, so a fully malformed table yields the empty set and the
/// form stays closed.
pub fn claim_permissions(rows: &[serde_json::Value]) -> BTreeSet<ClaimPermission> {
    let mut permissions = BTreeSet::new();
    for row in rows {
        let Some(status) = row
            .get(labels::CLAIM_STATUS_FIELD)
            .and_then(|status| status.as_str())
        else {
            continue;
        };
        if status != labels::CLAIM_STATUS_DRAFT {
            permissions.insert(ClaimPermission::Read);
        }
        if status == labels::CLAIM_STATUS_IN_PROGRESS {
            permissions.insert(ClaimPermission::Write);
        }
    }
    permissions
}
