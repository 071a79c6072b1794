//! Check on the CLR metadata root of managed images.

use crate::{
    anomalies::{Anomaly, AnomalyKey, AnomalyKind, CheckContext},
    pe::DataDirKey,
};

pub(crate) struct ClrChecks;

impl ClrChecks {
    pub(crate) fn run(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        let Some(clr) = ctx.clr else {
            return;
        };
        let Some(root) = &clr.metadata else {
            return;
        };

        if root.has_broken_version() {
            findings.push(Anomaly::new(
                AnomalyKind::BrokenClrVersionString,
                Some(AnomalyKey::DataDirectory(DataDirKey::ClrRuntimeHeader)),
                format!(
                    "CLR metadata version string region of {} bytes at {:#X} is malformed",
                    root.version_length, root.offset
                ),
            ));
        }
    }
}
