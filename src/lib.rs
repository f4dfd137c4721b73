pub mod address;
pub mod armor;
pub mod config;
pub mod error;
pub mod install;
pub mod patch;
pub mod preview;
pub mod skse;
pub mod temper;
pub mod versiondb;
pub mod weapon;

#[cfg(windows)]
mod game;
#[cfg(windows)]
mod hooks;

#[cfg(windows)]
mod plugin {
    use std::env;
    use std::sync::OnceLock;

    use anyhow::Result;
    use simplelog::LevelFilter;

    use super::address::RuntimeVersion;
    use super::error::{documents_dir, log_path, open_log};
    use super::hooks;
    use super::skse::*;

    static RUNTIME: OnceLock<RuntimeVersion> = OnceLock::new();

    #[no_mangle]
    #[allow(non_upper_case_globals)]
    pub static SKSEPlugin_Version: PluginVersionData =
        PluginVersionData::new(PLUGIN_VERSION, PLUGIN_NAME, "");

    #[no_mangle]
    #[allow(non_snake_case)]
    pub unsafe extern "C" fn SKSEPlugin_Query(
        skse: *const SkseInterface,
        info: *mut PluginInfo,
    ) -> bool {
        let (Some(skse), Some(info)) = (skse.as_ref(), info.as_mut()) else {
            return false;
        };
        info.info_version = PluginInfo::VERSION;
        info.name = PLUGIN_NAME_C.as_ptr();
        info.version = PLUGIN_VERSION;

        skse.is_editor == 0
    }

    unsafe extern "C" fn on_message(message: *mut Message) {
        let Some(message) = message.as_ref() else {
            return;
        };
        if message.kind != MESSAGE_DATA_LOADED {
            return;
        }
        let Some(&runtime) = RUNTIME.get() else {
            return;
        };

        match hooks::load(runtime) {
            Ok(()) => log::info!("Tempering bonuses are active"),
            Err(e) => log::error!("Tempering bonuses are disabled: {:#}", e),
        }
    }

    fn main(skse: &SkseInterface) -> Result<()> {
        let game_dir = env::current_dir()?;
        open_log(LevelFilter::Info, &log_path(documents_dir().as_deref(), &game_dir))?;
        log::info!("{} {}", PLUGIN_NAME, env!("CARGO_PKG_VERSION"));

        let runtime = RuntimeVersion(skse.runtime_version);
        // checked here so an unsupported game is reported before anything else happens
        runtime.variant()?;
        let _ = RUNTIME.set(runtime);

        unsafe { listen(skse, on_message) }
    }

    #[no_mangle]
    #[allow(non_snake_case)]
    pub unsafe extern "C" fn SKSEPlugin_Load(skse: *const SkseInterface) -> bool {
        let Some(skse) = skse.as_ref() else {
            return false;
        };

        match main(skse) {
            Ok(()) => true,
            Err(e) => {
                log::error!("{:#}", e);
                false
            }
        }
    }
}
