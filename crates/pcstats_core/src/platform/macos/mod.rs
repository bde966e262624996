//! Provedores nativos do macOS (Apple Silicon).

mod ffi;
pub mod hid;
pub mod ioreport;
pub mod smc;

use crate::counters::CpuTicks;

pub use hid::HidThermal;
pub use ioreport::IoReport;
pub use smc::SmcConnection;

const HOST_CPU_LOAD_INFO: i32 = 3;
const CPU_STATE_MAX: usize = 4;
const CPU_STATE_IDLE: usize = 2;

/// Ticks agregados via `host_statistics(HOST_CPU_LOAD_INFO)`.
///
/// Estados: user, system, idle, nice.
pub fn host_cpu_ticks() -> Option<CpuTicks> {
    let mut info = [0i32; CPU_STATE_MAX];
    let mut count = CPU_STATE_MAX as u32;
    // SAFETY: `info` comporta `count` naturais.
    let kr = unsafe {
        ffi::host_statistics(
            ffi::mach_host_self(),
            HOST_CPU_LOAD_INFO,
            info.as_mut_ptr(),
            &mut count,
        )
    };
    if kr != ffi::KERN_SUCCESS {
        return None;
    }
    let ticks = info.map(|t| t as u32 as u64);
    Some(CpuTicks {
        total: ticks.iter().sum(),
        idle: ticks[CPU_STATE_IDLE],
    })
}
