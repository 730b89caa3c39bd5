//! Chooses between the questioning and the forced-diagnosis behaviour.
//!
//! The only signal used is the length of the history the caller sent back, so
//! the decision is a fixed threshold rather than any judgement about how much
//! has actually been learned.

/// History length from which the model is told it must submit the diagnosis.
pub const DIAGNOSIS_HISTORY_THRESHOLD: usize = 2;

const QUESTIONING_DIRECTIVE: &str = "ask 2-3 clarifying questions about the skin condition \
     before any verdict. You may call submit_diagnosis only if the information is already sufficient.";

const FORCE_DIAGNOSIS_DIRECTIVE: &str = "produce the final differential diagnosis now. \
     You MUST call the submit_diagnosis function and MUST NOT answer in free text.";

/// Directive for the current stage and whether it demands the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub directive: &'static str,
    pub force_tool: bool,
}

pub fn decide(history_len: usize) -> StagePlan {
    if history_len < DIAGNOSIS_HISTORY_THRESHOLD {
        StagePlan {
            directive: QUESTIONING_DIRECTIVE,
            force_tool: false,
        }
    } else {
        StagePlan {
            directive: FORCE_DIAGNOSIS_DIRECTIVE,
            force_tool: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_history_keeps_questioning() {
        for len in 0..DIAGNOSIS_HISTORY_THRESHOLD {
            let plan = decide(len);
            assert!(!plan.force_tool);
            assert!(plan.directive.contains("clarifying questions"));
        }
    }

    #[test]
    fn test_threshold_forces_diagnosis() {
        for len in [DIAGNOSIS_HISTORY_THRESHOLD, DIAGNOSIS_HISTORY_THRESHOLD + 1, 10] {
            let plan = decide(len);
            assert!(plan.force_tool);
            assert!(plan.directive.contains("MUST call the submit_diagnosis"));
        }
    }
}
