//! Identity and resource identifiers.
//!
//! These are the atoms the rest of the data model is built from. None of
//! them carry behavior beyond construction, parsing, and the ordering
//! needed to produce the sorted sets §3/§4 require.

use serde::{Deserialize, Serialize};

/// An opaque account identifier plus the user's email.
///
/// Equality is by identifier only, per §3 — a `UserId` with a different
/// email but the same identifier is still the same user. Ordering (needed
/// for sorted reviewer sets) is by email, since identifiers are opaque and
/// emails are the field reviewers actually compare.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserId {
    pub id: String,
    pub email: String,
}

impl UserId {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self { id: id.into(), email: email.into() }
    }

    /// The `user:<email>` principal form used in IAM policy bindings.
    pub fn principal(&self) -> String {
        format!("user:{}", self.email)
    }
}

impl PartialEq for UserId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for UserId {}

impl std::hash::Hash for UserId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for UserId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UserId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.email.cmp(&other.email)
    }
}

/// An unqualified project name.
///
/// Bijects with a full resource name of the form
/// `//cloudresourcemanager.googleapis.com/projects/<id>` (§3). Parsing a
/// full resource name that is not a bare project (e.g. has an extra path
/// segment, or names a folder/organization) returns `None`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

const PROJECT_RESOURCE_PREFIX: &str = "//cloudresourcemanager.googleapis.com/projects/";

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn full_resource_name(&self) -> String {
        format!("{PROJECT_RESOURCE_PREFIX}{}", self.0)
    }

    /// Parse a full resource name, accepting only bare leaf-project resources.
    pub fn from_full_resource_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(PROJECT_RESOURCE_PREFIX)?;
        if rest.is_empty() || rest.contains('/') {
            return None;
        }
        Some(Self(rest.to_string()))
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The triple (resource full name, role name). The role string is opaque
/// beyond its use as a map/set key — e.g. `"roles/viewer"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleBinding {
    pub resource: String,
    pub role: String,
}

impl RoleBinding {
    pub fn new(resource: impl Into<String>, role: impl Into<String>) -> Self {
        Self { resource: resource.into(), role: role.into() }
    }
}

/// The IAM hierarchy root at which the engine searches for eligibility
/// bindings — an organization, folder, or project (§6 `scope` key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeId {
    Organization(String),
    Folder(String),
    Project(String),
}

impl ScopeId {
    /// Parse `organizations/<id>` | `folders/<id>` | `projects/<id>`.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, id) = s.split_once('/')?;
        if id.is_empty() || id.contains('/') {
            return None;
        }
        match kind {
            "organizations" => Some(Self::Organization(id.to_string())),
            "folders" => Some(Self::Folder(id.to_string())),
            "projects" => Some(Self::Project(id.to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Organization(id) => write!(f, "organizations/{id}"),
            Self::Folder(id) => write!(f, "folders/{id}"),
            Self::Project(id) => write!(f, "projects/{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_equality_ignores_email() {
        let a = UserId::new("u1", "alice@example.com");
        let b = UserId::new("u1", "alice-alt@example.com");
        assert_eq!(a, b);
    }

    #[test]
    fn project_id_round_trips_through_full_resource_name() {
        let project = ProjectId::new("project-1");
        let name = project.full_resource_name();
        assert_eq!(ProjectId::from_full_resource_name(&name), Some(project));
    }

    #[test]
    fn project_id_rejects_non_bare_resource_names() {
        assert_eq!(
            ProjectId::from_full_resource_name(
                "//cloudresourcemanager.googleapis.com/projects/project-1/extra"
            ),
            None
        );
        assert_eq!(
            ProjectId::from_full_resource_name("//cloudresourcemanager.googleapis.com/folders/f1"),
            None
        );
    }

    #[test]
    fn scope_id_parses_all_three_kinds() {
        assert_eq!(ScopeId::parse("organizations/123"), Some(ScopeId::Organization("123".into())));
        assert_eq!(ScopeId::parse("folders/456"), Some(ScopeId::Folder("456".into())));
        assert_eq!(ScopeId::parse("projects/proj-1"), Some(ScopeId::Project("proj-1".into())));
        assert_eq!(ScopeId::parse("garbage"), None);
    }
}
