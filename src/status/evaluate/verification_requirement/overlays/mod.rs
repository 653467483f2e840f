mod constants;
mod preview;
mod stubs;

pub(super) use constants::{
    STUB_REASON_OUTPUTS_EQUAL_AFTER_WORKAROUND, STUB_REASON_OUTPUTS_EQUAL_NEEDS_WORKAROUND,
};
pub(super) use preview::build_stub_blockers_preview;
pub(super) use stubs::{
    surface_overlays_behavior_exclusion_stub_batch, surface_overlays_requires_argv_stub_batch,
};
