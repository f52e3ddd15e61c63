#[cfg(target_arch = "x86_64")]
pub fn cpuid(eax: u32, ecx: u32) -> (u32, u32, u32, u32) {
    let mut ebx: u32;
    let mut edx: u32;
    let mut eax_out = eax;
    let mut ecx_out = ecx;

    unsafe {
        std::arch::asm!(
            "mov {0:r}, rbx",
            "cpuid",
            "xchg {0:r}, rbx",
            out(reg) ebx,
            inout("eax") eax_out,
            inout("ecx") ecx_out,
            out("edx") edx,
            options(nostack, preserves_flags)
        );
    }

    (eax_out, ebx, ecx_out, edx)
}

#[cfg(not(target_arch = "x86_64"))]
pub fn cpuid(_eax: u32, _ecx: u32) -> (u32, u32, u32, u32) {
    (0, 0, 0, 0)
}

/// 12-byte vendor string from leaf 0 ("GenuineIntel")
pub fn vendor() -> String {
    let (_eax, ebx, ecx, edx) = cpuid(0, 0);
    [ebx, edx, ecx]
        .iter()
        .flat_map(|reg| reg.to_le_bytes())
        .map(char::from)
        .collect()
}

/// Display family, display model and stepping from leaf 1
pub fn signature() -> (u32, u32, u32) {
    let (eax, _ebx, _ecx, _edx) = cpuid(1, 0);

    let stepping = eax & 0xF;
    let model = (eax >> 4) & 0xF;
    let family = (eax >> 8) & 0xF;
    let extended_model = (eax >> 16) & 0xF;
    let extended_family = (eax >> 20) & 0xFF;

    let display_family = if family == 0xF {
        family + extended_family
    } else {
        family
    };

    let display_model = if family == 0x6 || family == 0xF {
        (extended_model << 4) + model
    } else {
        model
    };

    (display_family, display_model, stepping)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_arch = "x86_64")]
    fn test_vendor_is_printable() {
        let vendor = vendor();
        assert_eq!(vendor.len(), 12);
        assert!(vendor.chars().all(|c| c.is_ascii_graphic() || c == ' '));
    }
}
