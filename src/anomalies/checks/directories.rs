//! Checks on the data directory table and its entries.

use crate::{
    anomalies::{Anomaly, AnomalyKey, AnomalyKind, CheckContext},
    pe::{optional::DATA_DIR_COUNT, DataDirKey, ResolvedDataDir},
};

pub(crate) struct DirectoryChecks;

impl DirectoryChecks {
    pub(crate) fn run(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        Self::check_table_extent(ctx, findings);
        for resolved in ctx.directories {
            Self::check_entry(ctx, resolved, findings);
        }
    }

    fn check_table_extent(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        let Some(opt) = ctx.optional else {
            return;
        };
        let expected = (opt.number_of_rva_and_sizes() as usize).min(DATA_DIR_COUNT);
        let present = opt.data_directories().len();
        if present < expected {
            findings.push(Anomaly::new(
                AnomalyKind::TruncatedDataDirTable,
                None,
                format!(
                    "file ends inside the data directory table, {present} of {expected} entries present"
                ),
            ));
        }
    }

    fn check_entry(ctx: &CheckContext<'_>, resolved: &ResolvedDataDir, findings: &mut Vec<Anomaly>) {
        let entry = resolved.entry;
        if !entry.is_present() {
            return;
        }
        let key = Some(AnomalyKey::DataDirectory(entry.key));

        if entry.key == DataDirKey::Reserved {
            findings.push(Anomaly::new(
                AnomalyKind::ReservedDataDir,
                key,
                format!(
                    "reserved data directory slot declares address {:#X} with size {:#X}",
                    entry.virtual_address, entry.size
                ),
            ));
        }

        if entry.virtual_address != 0 && entry.size == 0 {
            findings.push(Anomaly::new(
                AnomalyKind::ZeroSizeDataDir,
                key,
                format!(
                    "data directory {} declares address {:#X} with zero size",
                    entry.key, entry.virtual_address
                ),
            ));
        }

        // The certificate slot holds a raw file offset; the RVA based rules below do
        // not apply to it.
        if entry.virtual_address == 0 || entry.key.is_file_offset_based() {
            return;
        }

        match resolved.file_offset {
            None => {
                findings.push(Anomaly::new(
                    AnomalyKind::InvalidDataDir,
                    key,
                    format!(
                        "data directory {} RVA {:#X} maps to no file data",
                        entry.key, entry.virtual_address
                    ),
                ));
            }
            Some(offset) if offset >= ctx.sections.file_size() => {
                findings.push(Anomaly::new(
                    AnomalyKind::InvalidDataDir,
                    key,
                    format!(
                        "data directory {} resolves to {:#X}, beyond the {} byte file",
                        entry.key,
                        offset,
                        ctx.sections.file_size()
                    ),
                ));
            }
            Some(_) => Self::check_fractionated(ctx, resolved, findings),
        }
    }

    fn check_fractionated(
        ctx: &CheckContext<'_>,
        resolved: &ResolvedDataDir,
        findings: &mut Vec<Anomaly>,
    ) {
        let entry = resolved.entry;
        if entry.size == 0 {
            return;
        }
        let start = u64::from(entry.virtual_address);
        let end = start + u64::from(entry.size) - 1;

        let (Some(first), Some(last)) = (
            ctx.sections.section_containing_rva(start),
            ctx.sections.section_containing_rva(end),
        ) else {
            return;
        };

        if first != last {
            findings.push(Anomaly::new(
                AnomalyKind::FractionatedDatadir,
                Some(AnomalyKey::DataDirectory(entry.key)),
                format!(
                    "data directory {} starts in section {} and ends in section {}",
                    entry.key, first, last
                ),
            ));
        }
    }
}
