//! # chaslice-raw
//!
//! Register definitions for the CHA (Caching/Home Agent) uncore boxes of
//! Intel Xeon Scalable processors, from Skylake-SP to Sapphire Rapids.
//!
//! This crate holds the per-generation register maps, the typed counter
//! control layout and the 8-byte MSR access primitive. It carries no policy:
//! programming order, error tolerance and logging belong to the agent.
//!
//! ## Features
//!
//! Select the build-default generation via feature flags:
//! - `skylake` - Skylake-SP
//! - `cascadelake` - Cascade Lake-SP
//! - `icelake` (default) - Ice Lake-SP
//! - `sapphirerapids` - Sapphire Rapids
//!
//! ## Usage
//!
//! ```no_run
//! use chaslice_raw::{current_profile, MsrAccess, MsrFile, RegisterLayout};
//!
//! let profile = current_profile();
//! let msr = MsrFile::open(0)?;
//!
//! let ctrl = profile.encode_control(0x34, 0x11);
//! msr.write(profile.counter_ctl(0, 0), ctrl.to_msr_value())?;
//! # Ok::<(), chaslice_raw::MsrError>(())
//! ```

pub mod arch;
pub mod msr;
pub mod register;

pub use arch::{ChaCounterControl, ChaProfile, Generation};
pub use msr::{MsrAccess, MsrError, MsrFile, Result};
pub use register::{Register, RegisterLayout};

/// Profile of the generation selected by the crate features
pub fn current_profile() -> &'static dyn ChaProfile {
    Generation::build_default().profile()
}
