//! Structural validation of parsed pipelines.
//!
//! Runs after parsing and before anything is spawned. All rules are checked
//! so the caller can report every problem at once.

mod issue;

pub use issue::{IssueCode, ValidationIssue};

use chainsh_types::PipelineSpec;

/// Outcome of validating a [`PipelineSpec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Human-readable reasons, one per issue.
    pub fn reasons(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }

    fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }
}

/// Check a parsed pipeline for structural problems.
pub fn validate(spec: &PipelineSpec) -> ValidationReport {
    let mut report = ValidationReport::default();

    if spec.stages().is_empty() {
        report.push(ValidationIssue::new(IssueCode::NoStages, "no program calls"));
    }

    for (index, stage) in spec.stages().iter().enumerate() {
        if stage.is_empty() {
            report.push(
                ValidationIssue::new(
                    IssueCode::EmptyStage,
                    format!("stage {} has no program", index + 1),
                )
                .at_stage(index),
            );
        }
    }

    if spec.stdout_path().is_some_and(|p| p.as_os_str().is_empty()) {
        report.push(ValidationIssue::new(
            IssueCode::EmptyRedirectTarget,
            "standard-output redirect has no target",
        ));
    }
    if spec.stderr_path().is_some_and(|p| p.as_os_str().is_empty()) {
        report.push(ValidationIssue::new(
            IssueCode::EmptyRedirectTarget,
            "error-output redirect has no target",
        ));
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsh_types::Stage;

    #[test]
    fn zero_stages_is_reported() {
        let report = validate(&PipelineSpec::new(vec![]));
        assert!(!report.is_valid());
        assert_eq!(report.issues()[0].code, IssueCode::NoStages);
        assert_eq!(report.reasons(), ["no program calls"]);
    }

    #[test]
    fn every_empty_stage_is_reported() {
        let spec = PipelineSpec::new(vec![Stage::default(), Stage::default()]);
        let report = validate(&spec);
        let stages: Vec<_> = report.issues().iter().map(|i| i.stage).collect();
        assert_eq!(stages, [Some(0), Some(1)]);
    }

    #[test]
    fn issue_format_includes_code() {
        let issue = ValidationIssue::new(IssueCode::EmptyStage, "stage 2 has no program");
        assert_eq!(issue.format(), "error[E002]: stage 2 has no program");
    }
}
