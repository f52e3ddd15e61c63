// CPU generation detection

use once_cell::sync::Lazy;

use chaslice_raw::Generation;

use crate::common::cpuid;

/// Generation of the running CPU, `None` on anything without CHA support
pub static CPU_GENERATION: Lazy<Option<Generation>> = Lazy::new(detect_generation);

/// Pick the generation to run with: an explicit request wins, then the
/// detected generation, then the build default
pub fn resolve_generation(requested: Option<Generation>) -> Generation {
    select(requested, *CPU_GENERATION)
}

fn select(requested: Option<Generation>, detected: Option<Generation>) -> Generation {
    if let Some(generation) = requested {
        tracing::info!("Using requested CPU generation: {}", generation);
        return generation;
    }
    detected.unwrap_or_else(|| {
        let fallback = Generation::build_default();
        tracing::warn!("CPU not recognised, falling back to {}", fallback);
        fallback
    })
}

pub fn detect_generation() -> Option<Generation> {
    let vendor = cpuid::vendor();
    let (family, model, stepping) = cpuid::signature();

    tracing::info!(
        "CPU: {} Family {:X}, Model {:X}, Stepping {:X}",
        vendor,
        family,
        model,
        stepping
    );

    if vendor != "GenuineIntel" {
        tracing::warn!("Non-Intel CPU detected, no CHA boxes available");
        return None;
    }

    let generation = classify(family, model, stepping);
    match generation {
        Some(g) => tracing::info!("Detected CPU generation: {}", g.name()),
        None => tracing::warn!("Unsupported Intel CPU model: {:X}", model),
    }
    generation
}

/// Map a family/model/stepping signature to a supported Xeon generation
pub fn classify(family: u32, model: u32, stepping: u32) -> Option<Generation> {
    if family != 0x6 {
        return None;
    }

    match model {
        // Skylake-SP and Cascade Lake-SP share the model number
        0x55 => {
            if stepping >= 5 {
                Some(Generation::CascadeLake)
            } else {
                Some(Generation::Skylake)
            }
        }
        0x6A | 0x6C => Some(Generation::IceLake),
        0x8F | 0xCF => Some(Generation::SapphireRapids),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_server_models() {
        assert_eq!(classify(6, 0x55, 4), Some(Generation::Skylake));
        assert_eq!(classify(6, 0x55, 7), Some(Generation::CascadeLake));
        assert_eq!(classify(6, 0x6A, 6), Some(Generation::IceLake));
        assert_eq!(classify(6, 0x8F, 8), Some(Generation::SapphireRapids));
    }

    #[test]
    fn test_classify_rejects_client_parts() {
        assert_eq!(classify(6, 0x9E, 10), None);
        assert_eq!(classify(0x19, 0x01, 1), None);
    }

    #[test]
    fn test_resolve_prefers_request() {
        assert_eq!(
            select(Some(Generation::IceLake), Some(Generation::Skylake)),
            Generation::IceLake
        );
        assert_eq!(select(None, Some(Generation::Skylake)), Generation::Skylake);
        assert_eq!(select(None, None), Generation::build_default());
    }

    #[test]
    fn test_resolve_uses_cached_detection() {
        let expected = CPU_GENERATION.unwrap_or_else(Generation::build_default);
        assert_eq!(resolve_generation(None), expected);
        assert_eq!(resolve_generation(None), expected);
        assert_eq!(
            resolve_generation(Some(Generation::SapphireRapids)),
            Generation::SapphireRapids
        );
    }
}
