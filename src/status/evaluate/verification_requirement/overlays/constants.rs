pub(crate) const STUB_BLOCKERS_PREVIEW_LIMIT: usize = 10;
pub(crate) const STUB_FORMS_PREVIEW_LIMIT: usize = 5;
pub(crate) const STUB_REQUIRES_ARGV_PREVIEW_LIMIT: usize = 3;
pub(crate) const STUB_VALUE_EXAMPLES_PREVIEW_LIMIT: usize = 3;
pub(crate) const STUB_DELTA_EVIDENCE_PATHS_LIMIT: usize = 2;
pub(crate) const STUB_EVIDENCE_PREVIEW_LIMIT: usize = 6;

#[cfg(test)]
pub(crate) const STUB_REASON_MISSING_VALUE_EXAMPLES: &str = "missing_value_examples";
pub(crate) const STUB_REASON_OUTPUTS_EQUAL_NEEDS_WORKAROUND: &str =
    "outputs_equal_needs_workaround";
pub(crate) const STUB_REASON_OUTPUTS_EQUAL_AFTER_WORKAROUND: &str =
    "outputs_equal_after_workaround";
