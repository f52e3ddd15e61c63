pub mod affinity;
pub mod arch;
pub mod cache;
pub mod cpuid;
pub mod msr;

pub use affinity::{pin_current_thread, AffinityGuard};
pub use arch::{detect_generation, resolve_generation, CPU_GENERATION};
pub use msr::SocketMsrs;
