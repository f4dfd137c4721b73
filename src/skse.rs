//! Script extender plugin interface

use std::ffi::{c_char, c_void, CStr};

use anyhow::{anyhow, Result};

use super::address::RuntimeVersion;

pub const PLUGIN_NAME: &str = "SensibleTempering";
pub const PLUGIN_NAME_C: &CStr = c"SensibleTempering";
const INTERFACE_MESSAGING: u32 = 5;
pub const MESSAGE_DATA_LOADED: u32 = 8;
const SENDER_SKSE: &[u8] = b"SKSE\0";

#[repr(C)]
pub struct SkseInterface {
    pub skse_version: u32,
    pub runtime_version: u32,
    pub editor_version: u32,
    pub is_editor: u32,
    pub query_interface: unsafe extern "C" fn(u32) -> *mut c_void,
    pub get_plugin_handle: unsafe extern "C" fn() -> u32,
    pub get_release_index: unsafe extern "C" fn() -> u32,
    pub get_plugin_info: unsafe extern "C" fn(*const c_char) -> *const c_void,
}

#[repr(C)]
pub struct Message {
    pub sender: *const c_char,
    pub kind: u32,
    pub data_len: u32,
    pub data: *mut c_void,
}

pub type EventCallback = unsafe extern "C" fn(*mut Message);

#[repr(C)]
#[allow(dead_code)]
struct MessagingInterface {
    interface_version: u32,
    register_listener: unsafe extern "C" fn(u32, *const c_char, EventCallback) -> bool,
    dispatch: unsafe extern "C" fn(u32, u32, *mut c_void, u32, *const c_char) -> bool,
    get_event_dispatcher: unsafe extern "C" fn(u32) -> *mut c_void,
}

/// Answer to the SE-style query
#[repr(C)]
pub struct PluginInfo {
    pub info_version: u32,
    pub name: *const c_char,
    pub version: u32,
}

impl PluginInfo {
    pub const VERSION: u32 = 1;
}

/// Version data the AE loader reads from the DLL's exports
#[repr(C)]
pub struct PluginVersionData {
    pub data_version: u32,
    pub plugin_version: u32,
    pub name: [u8; 256],
    pub author: [u8; 256],
    pub support_email: [u8; 252],
    pub version_independence_ex: u32,
    pub version_independence: u32,
    pub compatible_versions: [u32; 16],
    pub se_version_required: u32,
}

impl PluginVersionData {
    pub const VERSION: u32 = 1;
    /// Offsets come from the address library, so any AE build is fine
    pub const ADDRESS_LIBRARY_POST_AE: u32 = 1;

    pub const fn new(plugin_version: u32, name: &str, author: &str) -> Self {
        Self {
            data_version: Self::VERSION,
            plugin_version,
            name: fixed_str(name),
            author: fixed_str(author),
            support_email: [0; 252],
            version_independence_ex: 0,
            version_independence: Self::ADDRESS_LIBRARY_POST_AE,
            compatible_versions: [0; 16],
            se_version_required: 0,
        }
    }
}

/// Nul-padded copy of `s`. Too-long strings are cut so the last byte stays nul.
const fn fixed_str<const N: usize>(s: &str) -> [u8; N] {
    let bytes = s.as_bytes();
    let mut out = [0u8; N];
    let mut i = 0;
    while i < bytes.len() && i + 1 < N {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

const fn parse_version_part(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let mut value = 0;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

/// Packed plugin version from the crate version
pub const PLUGIN_VERSION: u32 = RuntimeVersion::new(
    parse_version_part(env!("CARGO_PKG_VERSION_MAJOR")),
    parse_version_part(env!("CARGO_PKG_VERSION_MINOR")),
    parse_version_part(env!("CARGO_PKG_VERSION_PATCH")),
    0,
)
.0;

/// Registers `callback` for messages from the script extender itself
///
/// # Safety
/// `skse` must be the interface the loader passed to `SKSEPlugin_Load`.
pub unsafe fn listen(skse: &SkseInterface, callback: EventCallback) -> Result<()> {
    let messaging = ((skse.query_interface)(INTERFACE_MESSAGING) as *const MessagingInterface)
        .as_ref()
        .ok_or_else(|| anyhow!("Messaging interface is unavailable"))?;
    let handle = (skse.get_plugin_handle)();
    if !(messaging.register_listener)(handle, SENDER_SKSE.as_ptr().cast(), callback) {
        return Err(anyhow!("Could not register a messaging listener"));
    }
    Ok(())
}
