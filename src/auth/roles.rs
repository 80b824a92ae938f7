use serde::Deserialize;

/// Role set entry that opens an endpoint to every caller, anonymous ones included
pub const PUBLIC: &str = "public";

/// Role assigned to verified tokens that carry no `role` claim
pub const DEFAULT_ROLE: &str = "default";

/// Role assigned to callers on public paths or when authentication is disabled
pub const ANONYMOUS_ROLE: &str = "anonymous";

/// Flat list of role names allowed on an endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(Vec<String>);

impl RoleSet {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.iter().any(|r| r == role)
    }

    pub fn is_public(&self) -> bool {
        self.contains(PUBLIC)
    }
}

/// Grant or deny `role` against an endpoint's declared role set.
/// An undeclared set places no restriction beyond authentication.
pub fn authorize(role: &str, allowed: Option<&RoleSet>) -> bool {
    match allowed {
        None => true,
        Some(set) => set.is_public() || set.contains(role),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undeclared_roles_allow_everyone() {
        assert!(authorize("viewer", None));
        assert!(authorize(ANONYMOUS_ROLE, None));
    }

    #[test]
    fn membership_is_required_when_declared() {
        let admins = RoleSet::new(["admin"]);
        assert!(authorize("admin", Some(&admins)));
        assert!(!authorize("viewer", Some(&admins)));
        assert!(!authorize(DEFAULT_ROLE, Some(&admins)));
    }

    #[test]
    fn public_sentinel_admits_anonymous_callers() {
        let open = RoleSet::new([PUBLIC]);
        assert!(authorize(ANONYMOUS_ROLE, Some(&open)));
    }

    #[test]
    fn empty_set_denies_everyone() {
        assert!(!authorize("admin", Some(&RoleSet::default())));
    }
}
