//! Derives a user's default namespace from group membership.
//!
//! Groups are slash-delimited paths. The segment before the last one names
//! the namespace, and the last segment ends in `_<role>`:
//!
//! ```text
//! /org/teamA/payments_dev   -> namespace "teamA", role "dev"
//! ```
//!
//! The most privileged role wins. Ties across namespaces, and users without
//! any recognizable group, fall back to [`DEFAULT_NAMESPACE`].

use std::collections::BTreeSet;

/// Namespace used whenever group membership gives no unambiguous answer.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Membership in any group under this prefix marks a platform administrator.
pub const PLATFORM_ADMIN_PREFIX: &str = "/dataops/serviceroles/platform/";

/// Role keys and their rank. Lower rank means more privilege.
pub const ROLE_PRIORITY: &[(&str, u8)] = &[("adm", 1), ("dev", 2), ("view", 3)];

fn role_rank(role: &str) -> Option<u8> {
    ROLE_PRIORITY
        .iter()
        .find(|(key, _)| *key == role)
        .map(|(_, rank)| *rank)
}

/// A group path split into its namespace and role key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRole<'a> {
    pub namespace: &'a str,
    pub role: &'a str,
    pub rank: u8,
}

/// Parse a group path, returning `None` for anything that does not carry a
/// recognized role.
pub fn parse_group(group: &str) -> Option<GroupRole<'_>> {
    let path = group.strip_prefix('/')?;
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2 {
        return None;
    }

    let namespace = segments[segments.len() - 2];
    let last = segments[segments.len() - 1];
    if namespace.is_empty() {
        return None;
    }

    let (_, role) = last.rsplit_once('_')?;
    if role.is_empty() {
        return None;
    }
    let rank = role_rank(role)?;

    Some(GroupRole {
        namespace,
        role,
        rank,
    })
}

/// Pick the default namespace for a list of group paths.
pub fn resolve_default_namespace<S: AsRef<str>>(groups: &[S]) -> String {
    if groups
        .iter()
        .any(|g| g.as_ref().starts_with(PLATFORM_ADMIN_PREFIX))
    {
        return DEFAULT_NAMESPACE.to_string();
    }

    let mut best_rank = u8::MAX;
    let mut candidates: BTreeSet<&str> = BTreeSet::new();

    for group in groups {
        let Some(parsed) = parse_group(group.as_ref()) else {
            continue;
        };
        if parsed.rank < best_rank {
            best_rank = parsed.rank;
            candidates.clear();
            candidates.insert(parsed.namespace);
        } else if parsed.rank == best_rank {
            candidates.insert(parsed.namespace);
        }
    }

    match candidates.len() {
        1 => candidates
            .into_iter()
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        _ => DEFAULT_NAMESPACE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespace_and_role() {
        let parsed = parse_group("/org/teamA/payments_dev").unwrap();
        assert_eq!(parsed.namespace, "teamA");
        assert_eq!(parsed.role, "dev");
        assert_eq!(parsed.rank, 2);
    }

    #[test]
    fn role_is_text_after_last_underscore() {
        let parsed = parse_group("/ns/data_eng_adm").unwrap();
        assert_eq!(parsed.namespace, "ns");
        assert_eq!(parsed.role, "adm");
    }

    #[test]
    fn rejects_unparsable_groups() {
        for group in [
            "teamA/finance_dev",
            "/finance_dev",
            "/teamA/finance",
            "/teamA/finance_",
            "/teamA/finance_owner",
            "//finance_dev",
            "",
        ] {
            assert!(parse_group(group).is_none(), "{group} should not parse");
        }
    }

    #[test]
    fn platform_admin_short_circuits() {
        let groups = ["/teamA/x_adm", "/dataops/serviceroles/platform/platform_adm"];
        assert_eq!(resolve_default_namespace(&groups), DEFAULT_NAMESPACE);
    }

    #[test]
    fn higher_privilege_wins() {
        let groups = ["/teamA/finance_dev", "/teamA/finance_view"];
        assert_eq!(resolve_default_namespace(&groups), "teamA");

        let groups = ["/teamB/ops_view", "/teamA/app_adm", "/teamC/db_dev"];
        assert_eq!(resolve_default_namespace(&groups), "teamA");
    }

    #[test]
    fn same_namespace_at_same_rank_is_not_a_tie() {
        let groups = ["/teamA/x_dev", "/teamA/y_dev"];
        assert_eq!(resolve_default_namespace(&groups), "teamA");
    }

    #[test]
    fn tie_across_namespaces_falls_back() {
        let groups = ["/teamA/x_dev", "/teamB/y_dev"];
        assert_eq!(resolve_default_namespace(&groups), DEFAULT_NAMESPACE);
    }

    #[test]
    fn lower_rank_tie_does_not_mask_winner() {
        let groups = ["/teamA/x_view", "/teamB/y_view", "/teamC/z_dev"];
        assert_eq!(resolve_default_namespace(&groups), "teamC");
    }

    #[test]
    fn no_signal_falls_back() {
        let empty: [&str; 0] = [];
        assert_eq!(resolve_default_namespace(&empty), DEFAULT_NAMESPACE);
        assert_eq!(
            resolve_default_namespace(&["offline_access", "/uma_authorization"]),
            DEFAULT_NAMESPACE
        );
    }
}
