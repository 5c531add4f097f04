//! The services that the mod loader gives us. Everything that touches the game process (scanning,
//! hooking, the console) goes through these traits, so the rest of the crate never needs to know
//! which loader it is running under.

use std::{path::PathBuf, sync::Arc};

use eyre::Result;

use crate::hook::SetFileFn;

/// Console colours for log lines.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Colour {
    Grey,
    White,
    Yellow,
    Red,
}

/// The host's console.
pub trait HostLogger: Send + Sync {
    fn write_line(&self, text: &str, colour: Colour);
}

/// The result of a signature scan.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ScanResult {
    pub found: bool,

    /// Offset of the match from the start of the main module.
    pub offset: usize,
}

/// Called by the scanner once a scan has finished.
pub type ScanCallback = Box<dyn FnOnce(ScanResult) + Send>;

/// The loader's startup signature scanner.
pub trait StartupScanner: Send + Sync {
    /// Queues a scan of the main module for `pattern`. `callback` is invoked at some later point,
    /// possibly on another thread, or never.
    fn add_main_module_scan(&self, pattern: &str, callback: ScanCallback);

    /// Returns the base address of the game's main module.
    fn main_module_base(&self) -> usize;
}

/// An installed (or pending) detour.
pub trait FunctionHook: Send {
    /// Writes the detour into the target function. Only needed for hooks made by a
    /// [`HookFactory`].
    fn activate(&mut self) -> Result<()>;

    fn enable(&mut self);

    fn disable(&mut self);

    /// Returns the trampoline to the original implementation, if the hook has been placed yet.
    fn original(&self) -> Option<SetFileFn>;
}

/// The loader's hooking library.
pub trait HookFactory: Send + Sync {
    /// Creates a hook that redirects the function at `address` to `detour`. The hook does nothing
    /// until it is activated.
    fn create_hook(&self, detour: SetFileFn, address: usize) -> Result<Box<dyn FunctionHook>>;
}

/// A scan registry that is shared between mods, so that each signature is only scanned for once.
pub trait SharedScans: Send + Sync {
    /// Asks for `detour` to be hooked onto the shared `criManaPlayer_SetFile` scan. `owner` is the
    /// name shown in the registry's logs. The returned hook is already enabled, but its original
    /// function only becomes available once the shared scan finishes.
    fn create_hook(&self, detour: SetFileFn, owner: &str) -> Box<dyn FunctionHook>;
}

/// The mod loader itself.
pub trait ModLoader: Send + Sync {
    /// Returns the folder that the mod with the given ID is installed in.
    fn directory_for_mod_id(&self, id: &str) -> Option<PathBuf>;

    /// Returns the IDs of every mod that is currently enabled.
    fn active_mod_ids(&self) -> Vec<String>;

    fn startup_scanner(&self) -> Option<Arc<dyn StartupScanner>>;

    fn shared_scans(&self) -> Option<Arc<dyn SharedScans>>;
}

/// Information about this mod from its manifest.
#[derive(Clone, Debug)]
pub struct ModInfo {
    pub id: String,
    pub name: String,
}

/// Everything that the loader hands us when the mod is created.
#[derive(Clone)]
pub struct ModContext {
    pub loader: Arc<dyn ModLoader>,

    /// `None` if the loader's hooking library isn't available.
    pub hooks: Option<Arc<dyn HookFactory>>,

    pub logger: Arc<dyn HostLogger>,
    pub info: ModInfo,
    pub config: crate::settings::Config,
}
