use std::sync::OnceLock;

use anyhow::{anyhow, bail, Result};

pub const CALL_SIZE: usize = 5;
pub const ABS_JMP_SIZE: usize = 14;

const CALL_OPCODE: u8 = 0xE8;

/// rel32 from the end of an instruction of `inst_size` bytes at `from` to `to`
pub fn addr_offset(from: usize, to: usize, inst_size: usize) -> Result<[u8; 4]> {
    let delta = (to as i64).wrapping_sub((from + inst_size) as i64);
    let delta = i32::try_from(delta)
        .map_err(|_| anyhow!("{:#X} is out of rel32 range of {:#X}", to, from))?;
    Ok(delta.to_le_bytes())
}

pub fn call(from: usize, to: usize) -> Result<[u8; CALL_SIZE]> {
    let bytes = addr_offset(from, to, CALL_SIZE)?;
    Ok([CALL_OPCODE, bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Target of the relative call encoded in `bytes`, which sit at `from`
pub fn call_target(from: usize, bytes: &[u8; CALL_SIZE]) -> Result<usize> {
    if bytes[0] != CALL_OPCODE {
        bail!(
            "Expected a call at {:#X} but found {:02X?}",
            from,
            bytes
        );
    }

    let delta = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Ok((from + CALL_SIZE).wrapping_add_signed(delta as isize))
}

/// `jmp [rip+0]` followed by the 64-bit target
pub fn abs_jmp(to: usize) -> [u8; ABS_JMP_SIZE] {
    let mut stub = [0u8; ABS_JMP_SIZE];
    stub[..6].copy_from_slice(&[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00]);
    stub[6..].copy_from_slice(&(to as u64).to_le_bytes());
    stub
}

/// Something that can redirect 5-byte relative calls in code
pub trait CallInterceptor {
    /// Where the call at `site` currently goes
    fn call_target(&self, site: usize) -> Result<usize>;
    /// Points the call at `site` to `replacement`
    fn redirect(&mut self, site: usize, replacement: usize) -> Result<()>;
}

/// Address of the routine a patched call site used to reach. Set once when the site is patched.
#[derive(Debug, Default)]
pub struct OriginalRoutine(OnceLock<usize>);

impl OriginalRoutine {
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    pub fn address(&self) -> Option<usize> {
        self.0.get().copied()
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    fn set(&self, addr: usize) -> Result<()> {
        self.0
            .set(addr)
            .map_err(|_| anyhow!("Original routine was already captured"))
    }

    /// The original routine as a function pointer of type `F`.
    ///
    /// # Safety
    /// `F` must be a function pointer type matching the routine's real signature.
    pub unsafe fn get<F: Copy>(&self) -> Option<F> {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
        self.address().map(|addr| std::mem::transmute_copy::<usize, F>(&addr))
    }
}

/// A call site that now reaches a replacement routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstalledHook {
    pub site: usize,
    pub replacement: usize,
    pub original: usize,
}

/// Redirects every call in `sites` to `replacement` and stores the routine they used to call in
/// `original`.
///
/// Every site is read before any is written, so a site that doesn't hold a call leaves the code
/// untouched. `original` is set before the first write. If a write fails, the sites already written
/// are pointed back at their old targets.
pub fn install(
    interceptor: &mut impl CallInterceptor,
    sites: &[usize],
    replacement: usize,
    original: &OriginalRoutine,
) -> Result<Vec<InstalledHook>> {
    if original.is_set() {
        bail!("Call sites {:X?} were already redirected", sites);
    }
    let Some(&first) = sites.first() else {
        bail!("No call sites to redirect");
    };

    let targets = sites
        .iter()
        .map(|&site| interceptor.call_target(site))
        .collect::<Result<Vec<_>>>()?;
    let first_target = targets[0];
    for (site, target) in sites.iter().zip(&targets) {
        if *target != first_target {
            log::warn!(
                "Call at {:#X} goes to {:#X} but the call at {:#X} goes to {:#X}",
                site,
                target,
                first,
                first_target
            );
        }
    }

    original.set(first_target)?;

    let mut hooks = Vec::with_capacity(sites.len());
    for (&site, &target) in sites.iter().zip(&targets) {
        if let Err(e) = interceptor.redirect(site, replacement) {
            restore(interceptor, &hooks);
            return Err(e);
        }
        hooks.push(InstalledHook {
            site,
            replacement,
            original: target,
        });
    }

    Ok(hooks)
}

/// Points each hooked site back at the routine it called before. Failures are logged and the rest
/// are still restored.
pub fn restore(interceptor: &mut impl CallInterceptor, hooks: &[InstalledHook]) {
    for hook in hooks.iter().rev() {
        if let Err(e) = interceptor.redirect(hook.site, hook.original) {
            log::error!("Could not restore the call at {:#X}: {:#}", hook.site, e);
        }
    }
}

#[cfg(windows)]
pub use process::ProcessCode;

#[cfg(windows)]
mod process {
    use std::collections::HashMap;
    use std::ffi::c_void;

    use anyhow::{anyhow, bail, Result};
    use windows::Win32::System::Diagnostics::Debug::FlushInstructionCache;
    use windows::Win32::System::Memory::{
        VirtualAlloc, VirtualProtect, MEM_COMMIT, MEM_RESERVE, PAGE_EXECUTE_READWRITE,
        PAGE_PROTECTION_FLAGS,
    };
    use windows::Win32::System::Threading::GetCurrentProcess;

    use super::*;

    const TRAMPOLINE_SIZE: usize = 1 << 10;
    const ALLOCATION_GRANULARITY: usize = 0x1_0000;
    // leave room for the module itself when searching below its base
    const MAX_DISTANCE: usize = 0x7FF0_0000;

    unsafe fn write_code(addr: usize, bytes: &[u8]) -> Result<()> {
        let ptr = addr as *const c_void;
        let mut old_protect = PAGE_PROTECTION_FLAGS::default();
        VirtualProtect(ptr, bytes.len(), PAGE_EXECUTE_READWRITE, &mut old_protect)?;

        (addr as *mut u8).copy_from(bytes.as_ptr(), bytes.len());

        let mut ignored = PAGE_PROTECTION_FLAGS::default();
        VirtualProtect(ptr, bytes.len(), old_protect, &mut ignored)?;
        FlushInstructionCache(GetCurrentProcess(), Some(ptr), bytes.len())?;
        Ok(())
    }

    /// Executable page within rel32 range of the game, holding long jumps into this DLL
    struct Trampoline {
        base: usize,
        used: usize,
        stubs: HashMap<usize, usize>,
    }

    impl Trampoline {
        unsafe fn near(module_base: usize) -> Result<Self> {
            let mut addr = (module_base & !(ALLOCATION_GRANULARITY - 1)) - ALLOCATION_GRANULARITY;
            while module_base - addr < MAX_DISTANCE {
                let page = VirtualAlloc(
                    Some(addr as *const c_void),
                    TRAMPOLINE_SIZE,
                    MEM_COMMIT | MEM_RESERVE,
                    PAGE_EXECUTE_READWRITE,
                );
                if !page.is_null() {
                    log::info!("Allocated trampoline at {:#X}", page as usize);
                    return Ok(Self {
                        base: page as usize,
                        used: 0,
                        stubs: HashMap::new(),
                    });
                }
                addr -= ALLOCATION_GRANULARITY;
            }

            bail!("Could not allocate a trampoline near {:#X}", module_base)
        }

        /// Returns a stub that jumps to `to`, reusing one if it already exists
        unsafe fn stub(&mut self, to: usize) -> Result<usize> {
            if let Some(&stub) = self.stubs.get(&to) {
                return Ok(stub);
            }
            if self.used + ABS_JMP_SIZE > TRAMPOLINE_SIZE {
                bail!("Trampoline is full");
            }

            let stub = self.base + self.used;
            (stub as *mut u8).copy_from(abs_jmp(to).as_ptr(), ABS_JMP_SIZE);
            self.used += ABS_JMP_SIZE;
            self.stubs.insert(to, stub);
            Ok(stub)
        }
    }

    /// Patches the code of the running process
    pub struct ProcessCode {
        trampoline: Trampoline,
    }

    impl ProcessCode {
        /// # Safety
        /// Every site passed to this interceptor must be the start of a call instruction in the
        /// module at `module_base`.
        pub unsafe fn new(module_base: usize) -> Result<Self> {
            Ok(Self {
                trampoline: Trampoline::near(module_base)?,
            })
        }
    }

    impl CallInterceptor for ProcessCode {
        fn call_target(&self, site: usize) -> Result<usize> {
            let mut bytes = [0u8; CALL_SIZE];
            unsafe {
                (site as *const u8).copy_to_nonoverlapping(bytes.as_mut_ptr(), CALL_SIZE);
            }
            super::call_target(site, &bytes)
        }

        fn redirect(&mut self, site: usize, replacement: usize) -> Result<()> {
            unsafe {
                let stub = self.trampoline.stub(replacement)?;
                let bytes = call(site, stub)
                    .map_err(|e| anyhow!("Trampoline is too far from the call site: {}", e))?;
                write_code(site, &bytes)
            }
        }
    }
}
