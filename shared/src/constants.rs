//! Device names and I/O control codes.

pub const DEVICE_NAME: &str = r"\Device\Unhooker";
pub const DEVICE_SYMBOLIC_LINK: &str = r"\DosDevices\Unhooker";

pub const FILE_DEVICE_UNKNOWN: u32 = 0x0000_0022;
pub const METHOD_BUFFERED: u32 = 0;
pub const FILE_ANY_ACCESS: u32 = 0;

/// Rust equivalent of the `CTL_CODE` macro.
pub const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

/// Scan only; returns a packed report.
pub const IOCTL_UNHOOKER_GET_STATUS: u32 =
    ctl_code(FILE_DEVICE_UNKNOWN, 0x800, METHOD_BUFFERED, FILE_ANY_ACCESS);

/// Scan and restore every modified entry.
pub const IOCTL_UNHOOKER_UNHOOK: u32 =
    ctl_code(FILE_DEVICE_UNKNOWN, 0x801, METHOD_BUFFERED, FILE_ANY_ACCESS);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_codes_match_ctl_code_layout() {
        assert_eq!(IOCTL_UNHOOKER_GET_STATUS, 0x0022_2000);
        assert_eq!(IOCTL_UNHOOKER_UNHOOK, 0x0022_2004);
    }
}
