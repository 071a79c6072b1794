//! Checks on the COFF file header.

use crate::{
    anomalies::{Anomaly, AnomalyKey, AnomalyKind, CheckContext, HeaderField},
    pe::{layout::CoffField, FileCharacteristics},
};

/// Section count beyond which the Windows loader gives up.
const LOADER_SECTION_LIMIT: u64 = 95;

pub(crate) struct CoffChecks;

impl CoffChecks {
    pub(crate) fn run(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        Self::check_section_count(ctx, findings);
        Self::check_symbol_fields(ctx, findings);
        Self::check_characteristics(ctx, findings);
    }

    fn check_section_count(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        let count = ctx.coff.number_of_sections();
        let key = Some(AnomalyKey::Field(HeaderField::Coff(CoffField::NumberOfSections)));

        if count == 0 {
            findings.push(Anomaly::new(
                AnomalyKind::Sectionless,
                key,
                "the image declares no sections",
            ));
        } else if count > LOADER_SECTION_LIMIT {
            findings.push(Anomaly::new(
                AnomalyKind::TooManySections,
                key,
                format!("{count} sections declared, the loader handles at most {LOADER_SECTION_LIMIT}"),
            ));
        }
    }

    fn check_symbol_fields(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        let symbol_table = ctx.coff.pointer_to_symbol_table();
        if symbol_table != 0 {
            findings.push(Anomaly::new(
                AnomalyKind::DeprecatedCoffSymbolTable,
                Some(AnomalyKey::Field(HeaderField::Coff(CoffField::PointerToSymbolTable))),
                format!("deprecated COFF symbol table pointer {symbol_table:#X} in an image file"),
            ));
        }

        let symbols = ctx.coff.number_of_symbols();
        if symbols != 0 {
            findings.push(Anomaly::new(
                AnomalyKind::DeprecatedNrOfCoffSymbols,
                Some(AnomalyKey::Field(HeaderField::Coff(CoffField::NumberOfSymbols))),
                format!("deprecated COFF symbol count of {symbols} in an image file"),
            ));
        }
    }

    fn check_characteristics(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        let characteristics = ctx.coff.characteristics();
        let key = Some(AnomalyKey::Field(HeaderField::Coff(CoffField::Characteristics)));

        if characteristics.intersects(FileCharacteristics::RESERVED) {
            findings.push(Anomaly::new(
                AnomalyKind::ReservedFileCharacteristics,
                key,
                "reserved COFF characteristics bit 0x0040 is set",
            ));
        }

        // One finding per deprecated flag so each can be keyed and counted
        for (name, _) in characteristics
            .intersection(FileCharacteristics::DEPRECATED)
            .iter_names()
        {
            findings.push(Anomaly::new(
                AnomalyKind::DeprecatedFileCharacteristics,
                key,
                format!("deprecated COFF characteristics flag {name} is set"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test::{count_kind, has_kind, PeImage};
    use crate::{AnomalyKind, PeFile};

    #[test]
    fn sectionless_image_is_flagged() {
        let image = PeImage::minimal().no_sections().build();
        let pe = PeFile::from_mem(image).unwrap();
        assert!(has_kind(&pe.scan_anomalies(), AnomalyKind::Sectionless));
    }

    #[test]
    fn deprecated_flags_are_reported_per_bit() {
        // LINE_NUMS_STRIPPED | LOCAL_SYMS_STRIPPED | EXECUTABLE_IMAGE
        let image = PeImage::minimal().coff_characteristics(0x010E).build();
        let pe = PeFile::from_mem(image).unwrap();
        let findings = pe.scan_anomalies();
        assert_eq!(count_kind(&findings, AnomalyKind::DeprecatedFileCharacteristics), 2);
        assert!(!has_kind(&findings, AnomalyKind::ReservedFileCharacteristics));
    }

    #[test]
    fn reserved_bit_is_reported() {
        let image = PeImage::minimal().coff_characteristics(0x0142).build();
        let pe = PeFile::from_mem(image).unwrap();
        assert!(has_kind(&pe.scan_anomalies(), AnomalyKind::ReservedFileCharacteristics));
    }
}
