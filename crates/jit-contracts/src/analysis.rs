//! The policy-analysis document shape the external policy-analysis client
//! returns (§4.1 Input), and the IAM policy shape the resource-manager
//! client reads and writes (§4.6).

use serde::{Deserialize, Serialize};

/// The evaluation verdict an access-control list carries for its condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionEvaluation {
    True,
    False,
    Conditional,
}

/// A CEL condition attached to a binding: an optional reserved title, an
/// optional free-text description, and the trimmed expression text. The
/// activation title (`ACTIVATION_CONDITION_TITLE`) is recognized by exact
/// equality (§4.1); per-request context (e.g. "approved by bob@…") belongs
/// in `description`, never appended to the title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub expression: String,
}

/// One IAM binding: the members it grants the role to, the role itself,
/// and an optional condition restricting when the grant applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub members: Vec<String>,
    pub role: String,
    pub condition: Option<Condition>,
}

impl Binding {
    pub fn new(members: Vec<String>, role: impl Into<String>, condition: Option<Condition>) -> Self {
        Self { members, role: role.into(), condition }
    }
}

/// One access-control list entry within an analysis result: the resources
/// it applies to, and how its binding's condition evaluates there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlList {
    pub resources: Vec<String>,
    pub condition_evaluation: ConditionEvaluation,
}

/// One entry of the policy-analysis document: a binding paired with the
/// ACLs describing where and how it currently evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub binding: Binding,
    pub acls: Vec<AccessControlList>,
}

/// The current IAM policy on a project, as read/written by the
/// resource-manager client. `etag` backs the provisioner's optimistic
/// concurrency write (§4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamPolicy {
    pub bindings: Vec<Binding>,
    pub etag: String,
}

/// Write-time flags recognized by `addProjectIamBinding` (§4.6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingOptions {
    pub purge_existing_temporary_bindings: bool,
    pub fail_if_binding_exists: bool,
}

/// The reserved condition title the engine uses to recognize a binding it
/// provisioned as a time-bounded activation (§4.1, §4.3, §4.6).
pub const ACTIVATION_CONDITION_TITLE: &str = "JIT access activation";

/// The full response of a policy-analysis query: the analysis results plus
/// any non-critical errors the analyzer surfaced while producing them
/// (§4.1 "Non-critical errors").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub results: Vec<AnalysisResult>,
    pub warnings: Vec<String>,
}
