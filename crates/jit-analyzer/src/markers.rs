//! Recognized CEL markers (§4.1). A binding's condition designates the
//! binding's class only if its **trimmed expression equals** one of the
//! two marker strings exactly, or its **title equals** the reserved
//! activation title — anything more (an extra `&&` clause) is ignored.

use jit_contracts::analysis::{Condition, ACTIVATION_CONDITION_TITLE};
use jit_contracts::eligibility::ActivationType;

pub const JIT_MARKER: &str = "has({}.jitAccessConstraint)";
pub const PEER_MARKER: &str = "has({}.multiPartyApprovalConstraint)";

/// What a binding's condition designates, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Eligible(ActivationType),
    Active,
}

/// Classify a binding's condition. Returns `None` for an absent
/// condition, an unrecognized expression, or a marker expression with
/// extra clauses appended (§4.1 "A condition that *contains* a marker but
/// adds further clauses ... is ignored").
pub fn classify(condition: Option<&Condition>) -> Option<Classification> {
    let condition = condition?;

    if condition.title.as_deref() == Some(ACTIVATION_CONDITION_TITLE) {
        return Some(Classification::Active);
    }

    match condition.expression.trim() {
        JIT_MARKER => Some(Classification::Eligible(ActivationType::SelfApproval)),
        PEER_MARKER => Some(Classification::Eligible(ActivationType::PeerApproval)),
        _ => None,
    }
}
