#![no_main]

use libfuzzer_sys::fuzz_target;
use pescope::PeFile;

fuzz_target!(|data: &[u8]| {
    if let Ok(pe) = PeFile::from_mem(data.to_vec()) {
        let _ = pe.scan_anomalies();
        let _ = pe.resolve_rva(0x1000);
        let _ = pe.overlay_offset();
    }
});
