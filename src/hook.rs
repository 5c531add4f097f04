//! Describes the game function that we hook, and picks the way that it will be found.

use std::sync::Arc;

use eyre::{eyre, Result};
use libc::c_char;

use crate::host::{FunctionHook, HookFactory, ModLoader, SharedScans, StartupScanner};

/// `criManaPlayer_SetFile(player, binder, path)`. The player copies `path` before returning.
pub type SetFileFn = unsafe extern "C" fn(player: usize, binder: usize, path: *const c_char);

/// The prologue of `criManaPlayer_SetFile`.
pub const SET_FILE_PATTERN: &str = "4C 89 44 24 ?? 48 89 54 24 ?? 48 89 4C 24 ?? 48 83 EC 38 48 83 7C 24 ?? 00 75 ?? 41 B8 FE FF FF FF 48 8D 15 ?? ?? ?? ?? 31 C9";

/// The end of the path that the game passes when it plays its opening movie.
pub const OPENING_MOVIE_SUFFIX: &str = "Anim/MS_Event_Main_100_010_M_Movi_VP9.usm";

/// Mods that must both be active for the shared scan of `criManaPlayer_SetFile` to exist.
pub const SHARED_SCAN_PROVIDERS: [&str; 2] = ["Ryo.Reloaded", "SharedScans.Reloaded"];

/// How we get hold of `criManaPlayer_SetFile`.
pub enum Strategy {
    /// Hook onto the scan that other mods share.
    SharedScans(Arc<dyn SharedScans>),

    /// Scan the main module ourselves, then hook the address we find.
    StartupScanner {
        scanner: Arc<dyn StartupScanner>,
        hooks: Arc<dyn HookFactory>,
    },
}

impl Strategy {
    /// Picks the cheapest strategy that the loader supports.
    pub fn select(
        loader: &dyn ModLoader,
        hooks: Option<Arc<dyn HookFactory>>,
    ) -> Result<Strategy> {
        let active_mods = loader.active_mod_ids();
        let has_providers = SHARED_SCAN_PROVIDERS
            .iter()
            .all(|id| active_mods.iter().any(|active| active == id));

        if has_providers {
            log::debug!(
                "Shared Scans + Ryo Framework detected, using shared scan for criManaPlayer_SetFile."
            );

            match loader.shared_scans() {
                Some(shared) => return Ok(Strategy::SharedScans(shared)),
                None => log::warn!(
                    "Unable to get controller for Shared Scans. Falling back to the startup signature scanner."
                ),
            }
        }

        let scanner = loader.startup_scanner().ok_or_else(|| {
            eyre!("Unable to get controller for signature scanner. This mod won't work.")
        })?;

        let hooks = hooks.ok_or_else(|| {
            eyre!("Unable to access the hooking library. Is the shared hooks library installed?")
        })?;

        Ok(Strategy::StartupScanner { scanner, hooks })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::SharedScans(_) => "shared scans",
            Strategy::StartupScanner { .. } => "startup scanner",
        }
    }
}

/// Holds the installed detour, if there is one.
#[derive(Default)]
pub struct Hook {
    inner: Option<Box<dyn FunctionHook>>,
}

impl Hook {
    pub fn set(&mut self, hook: Box<dyn FunctionHook>) {
        self.inner = Some(hook);
    }

    /// Returns a pointer to the original implementation of the hooked function.
    pub fn original(&self) -> Option<SetFileFn> {
        self.inner.as_ref().and_then(|hook| hook.original())
    }

    pub fn enable(&mut self) {
        if let Some(hook) = self.inner.as_mut() {
            hook.enable();
        }
    }

    pub fn disable(&mut self) {
        if let Some(hook) = self.inner.as_mut() {
            hook.disable();
        }
    }

    /// Disables the detour and releases it.
    pub fn remove(&mut self) {
        if let Some(mut hook) = self.inner.take() {
            hook.disable();
        }
    }
}
