use std::fs::{self, File};
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::Result;
use simplelog::{Config, LevelFilter, WriteLogger};

pub const LOG_FILE_NAME: &str = "SensibleTempering.log";

/// Folder under `Documents\My Games` that the script extender writes its logs to, based on which
/// storefront's files are in the game directory
pub fn log_subdirectory(exists: impl Fn(&str) -> bool) -> Option<&'static str> {
    if exists("steam_api64.dll") {
        if exists("openvr_api.dll") || exists(r"Data\SkyrimVR.esm") {
            Some("Skyrim VR")
        } else {
            Some("Skyrim Special Edition")
        }
    } else if exists("Galaxy64.dll") {
        Some("Skyrim Special Edition GOG")
    } else if exists("eossdk-win64-shipping.dll") {
        Some("Skyrim Special Edition EPIC")
    } else {
        None
    }
}

/// Where the log goes. Without a documents folder or a recognized install, it lands in `skselogs`
/// next to the game.
pub fn log_path(documents: Option<&Path>, game_dir: &Path) -> PathBuf {
    let subdirectory = log_subdirectory(|name| game_dir.join(name).exists());
    let dir = match (documents, subdirectory) {
        (Some(documents), Some(subdirectory)) => documents
            .join("My Games")
            .join(subdirectory)
            .join("SKSE"),
        _ => game_dir.join("skselogs"),
    };
    dir.join(LOG_FILE_NAME)
}

pub fn open_log(log_level: LevelFilter, log_path: &Path) -> Result<()> {
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir)?;
    }
    let log_file = File::create(log_path)?;
    WriteLogger::init(log_level, Config::default(), log_file)?;
    panic::set_hook(Box::new(|info| {
        let msg = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown");
        let (file, line) = info
            .location()
            .map(|l| (l.file(), l.line()))
            .unwrap_or(("unknown", 0));
        log::error!("Panic in {} on line {}: {}", file, line, msg);
    }));
    #[cfg(windows)]
    crash::register();
    Ok(())
}

#[cfg(windows)]
pub use crash::documents_dir;

#[cfg(windows)]
mod crash {
    use std::ffi::c_void;
    use std::mem;
    use std::ops::BitAnd;
    use std::path::PathBuf;

    use windows::core::PWSTR;
    use windows::Win32::Foundation::{
        EXCEPTION_ACCESS_VIOLATION, EXCEPTION_ILLEGAL_INSTRUCTION, EXCEPTION_STACK_OVERFLOW,
        HMODULE, MAX_PATH,
    };
    use windows::Win32::System::Com::CoTaskMemFree;
    use windows::Win32::System::Diagnostics::Debug::{
        AddVectoredExceptionHandler, CONTEXT_CONTROL_AMD64, CONTEXT_INTEGER_AMD64,
        EXCEPTION_POINTERS,
    };
    use windows::Win32::System::Kernel::ExceptionContinueSearch;
    use windows::Win32::System::Memory::{
        VirtualQuery, MEMORY_BASIC_INFORMATION, MEM_COMMIT, PAGE_EXECUTE_READ,
        PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE,
    };
    use windows::Win32::System::ProcessStatus::{
        EnumProcessModules, GetModuleBaseNameW, GetModuleInformation, MODULEINFO,
    };
    use windows::Win32::System::Threading::GetCurrentProcess;
    use windows::Win32::UI::Shell::{FOLDERID_Documents, SHGetKnownFolderPath, KF_FLAG_DEFAULT};

    const STACK_DUMP_WORDS_PER_LINE: usize = 4;
    const STACK_DUMP_LINES: usize = 8;
    const READABLE_PROTECT: [PAGE_PROTECTION_FLAGS; 4] = [
        PAGE_EXECUTE_READ,
        PAGE_EXECUTE_READWRITE,
        PAGE_READWRITE,
        PAGE_READONLY,
    ];
    const MAX_MODULES: usize = 1000;

    pub fn documents_dir() -> Option<PathBuf> {
        unsafe {
            let path = SHGetKnownFolderPath(&FOLDERID_Documents, KF_FLAG_DEFAULT, None).ok()?;
            let dir = path.to_string().ok().map(PathBuf::from);
            CoTaskMemFree(Some(path.0 as *const c_void));
            dir
        }
    }

    pub fn register() {
        unsafe {
            AddVectoredExceptionHandler(0, Some(exception_handler));
        }
    }

    /// Whether `len` bytes at `addr` can be read without faulting again
    unsafe fn is_readable(addr: usize, len: usize) -> bool {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        let info_size = mem::size_of::<MEMORY_BASIC_INFORMATION>();
        if VirtualQuery(Some(addr as *const c_void), &mut info, info_size) < info_size {
            return false;
        }
        info.State == MEM_COMMIT
            && READABLE_PROTECT.iter().any(|p| info.Protect.bitand(*p) == *p)
            && addr + len <= info.BaseAddress as usize + info.RegionSize
    }

    unsafe fn dump_stack(sp: usize) {
        let len = STACK_DUMP_LINES * STACK_DUMP_WORDS_PER_LINE * mem::size_of::<usize>();
        if !is_readable(sp, len) {
            log::error!("Stack dump: {:016X} is not readable", sp);
            return;
        }

        log::error!("Stack dump:");
        let words = std::slice::from_raw_parts(
            sp as *const usize,
            STACK_DUMP_LINES * STACK_DUMP_WORDS_PER_LINE,
        );
        for (i, line) in words.chunks(STACK_DUMP_WORDS_PER_LINE).enumerate() {
            let addr = sp + i * STACK_DUMP_WORDS_PER_LINE * mem::size_of::<usize>();
            let words: Vec<_> = line.iter().map(|w| format!("{:016X}", w)).collect();
            log::error!("\t{:016X}: {}", addr, words.join(" "));
        }
    }

    unsafe fn dump_modules() {
        let mut modules = [HMODULE::default(); MAX_MODULES];
        let mut size_needed = 0;
        if EnumProcessModules(
            GetCurrentProcess(),
            modules.as_mut_ptr(),
            mem::size_of::<[HMODULE; MAX_MODULES]>() as u32,
            &mut size_needed,
        )
        .is_err()
        {
            log::error!("Modules: could not enumerate modules");
            return;
        }

        log::error!("Modules:");
        let num_modules = size_needed as usize / mem::size_of::<HMODULE>();
        for module in modules.into_iter().take(num_modules) {
            let mut name_buf = [0u16; MAX_PATH as usize];
            let chars_copied = GetModuleBaseNameW(GetCurrentProcess(), module, &mut name_buf);
            let module_name = if chars_copied == 0 || chars_copied >= name_buf.len() as u32 {
                String::from("<unknown>")
            } else {
                PWSTR::from_raw(name_buf.as_mut_ptr())
                    .to_string()
                    .unwrap_or_else(|_| String::from("<invalid>"))
            };

            let mut mod_info = MODULEINFO::default();
            let address_range = match GetModuleInformation(
                GetCurrentProcess(),
                module,
                &mut mod_info,
                mem::size_of::<MODULEINFO>() as u32,
            ) {
                Ok(_) => format!(
                    "{:016X}-{:016X}",
                    mod_info.lpBaseOfDll as usize,
                    mod_info.lpBaseOfDll as usize + mod_info.SizeOfImage as usize
                ),
                Err(e) => format!("error: {:?}", e),
            };

            log::error!("\t{}\t{}", module_name, address_range);
        }
    }

    unsafe extern "system" fn exception_handler(exc_info: *mut EXCEPTION_POINTERS) -> i32 {
        let Some(exc_info) = exc_info.as_ref() else {
            return ExceptionContinueSearch.0;
        };
        // the game raises and handles plenty of exceptions on its own; only report real crashes
        let fatal = exc_info.ExceptionRecord.as_ref().is_some_and(|record| {
            [
                EXCEPTION_ACCESS_VIOLATION,
                EXCEPTION_ILLEGAL_INSTRUCTION,
                EXCEPTION_STACK_OVERFLOW,
            ]
            .contains(&record.ExceptionCode)
        });
        if !fatal {
            return ExceptionContinueSearch.0;
        }

        let mut record_ptr = exc_info.ExceptionRecord;
        while let Some(record) = record_ptr.as_ref() {
            log::error!(
                "Unhandled exception {:08X} at {:016X}. Parameters: {:X?}",
                record.ExceptionCode.0,
                record.ExceptionAddress as usize,
                &record.ExceptionInformation[..record.NumberParameters as usize]
            );
            record_ptr = record.ExceptionRecord;
        }

        let mut sp = None;
        if let Some(context) = exc_info.ContextRecord.as_ref() {
            if context.ContextFlags.bitand(CONTEXT_INTEGER_AMD64) == CONTEXT_INTEGER_AMD64 {
                log::error!("\trax = {:016X}\trbx = {:016X}", context.Rax, context.Rbx);
                log::error!("\trcx = {:016X}\trdx = {:016X}", context.Rcx, context.Rdx);
                log::error!("\trsi = {:016X}\trdi = {:016X}", context.Rsi, context.Rdi);
                log::error!("\tr8  = {:016X}\tr9  = {:016X}", context.R8, context.R9);
                log::error!("\tr10 = {:016X}\tr11 = {:016X}", context.R10, context.R11);
                log::error!("\tr12 = {:016X}\tr13 = {:016X}", context.R12, context.R13);
                log::error!("\tr14 = {:016X}\tr15 = {:016X}", context.R14, context.R15);
            }

            if context.ContextFlags.bitand(CONTEXT_CONTROL_AMD64) == CONTEXT_CONTROL_AMD64 {
                log::error!("\trip = {:016X}\trbp = {:016X}", context.Rip, context.Rbp);
                log::error!("\trsp = {:016X}\teflags = {:08X}", context.Rsp, context.EFlags);
                sp = Some(context.Rsp as usize);
            }
        }

        match sp {
            Some(sp) => dump_stack(sp),
            None => log::error!("Stack dump: stack pointer was not present"),
        }
        dump_modules();

        ExceptionContinueSearch.0
    }
}
