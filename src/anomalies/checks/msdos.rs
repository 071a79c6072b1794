//! Checks on the MS-DOS header and stub.

use crate::anomalies::{Anomaly, AnomalyKind, CheckContext};

/// Linker emitted stubs end well below this; anything larger is carrying payload.
const LARGE_STUB_THRESHOLD: u64 = 0x400;

pub(crate) struct MsdosChecks;

impl MsdosChecks {
    pub(crate) fn run(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        Self::check_collapsed(ctx, findings);
        Self::check_stub_size(ctx, findings);
        Self::check_header_placement(ctx, findings);
    }

    fn check_collapsed(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        if ctx.dos.is_collapsed() {
            findings.push(Anomaly::new(
                AnomalyKind::CollapsedMsdosHeader,
                None,
                format!(
                    "PE header offset {:#X} points inside the MS-DOS header",
                    ctx.dos.pe_header_offset()
                ),
            ));
        }
    }

    fn check_stub_size(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        let stub = ctx.dos.stub_size();
        if stub > LARGE_STUB_THRESHOLD {
            findings.push(Anomaly::new(
                AnomalyKind::LargeMsdosStub,
                None,
                format!("MS-DOS stub of {stub} bytes before the PE header"),
            ));
        }
    }

    fn check_header_placement(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        if ctx.overlay_offset < ctx.sections.file_size() && ctx.pe_offset >= ctx.overlay_offset {
            findings.push(Anomaly::new(
                AnomalyKind::PeHeaderInOverlay,
                None,
                format!(
                    "PE header at {:#X} lies in the overlay starting at {:#X}",
                    ctx.pe_offset, ctx.overlay_offset
                ),
            ));
        }
    }
}
