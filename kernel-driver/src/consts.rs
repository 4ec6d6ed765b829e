//! NT status values used by the unhooker device.
//!
//! The engine runs against a platform layer that speaks NTSTATUS, so the
//! handful of codes we complete requests with live here.

/// Signed 32-bit NT status, same representation as the kernel's `NTSTATUS`.
pub type NtStatus = i32;

/*────────── success / informational ─────────*/

pub const STATUS_SUCCESS: NtStatus = 0x0000_0000;

/*────────── warnings ─────────*/

/// Output buffer cannot hold even the report header.
pub const STATUS_BUFFER_OVERFLOW: NtStatus = 0x8000_0005_u32 as NtStatus;

/*────────── errors ─────────*/

pub const STATUS_UNSUCCESSFUL: NtStatus = 0xC000_0001_u32 as NtStatus;
pub const STATUS_INVALID_DEVICE_REQUEST: NtStatus = 0xC000_0010_u32 as NtStatus;
pub const STATUS_INSUFFICIENT_RESOURCES: NtStatus = 0xC000_009A_u32 as NtStatus;
pub const STATUS_INTERNAL_ERROR: NtStatus = 0xC000_00E5_u32 as NtStatus;

/// Rust equivalent of the `NT_SUCCESS` macro.
#[inline]
pub const fn nt_success(status: NtStatus) -> bool {
    status >= 0
}
