//! Intercepts `criManaPlayer_SetFile` and swaps the path of the opening movie.
//!
//! The game calls the detour for every movie it plays. Anything that isn't the opening is passed
//! straight through without touching the rotation, so the cost for other movies is a suffix
//! comparison and a debug log.

use std::{
    ffi::{CStr, CString},
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use libc::c_char;
use once_cell::sync::Lazy;

use crate::{
    hook::{Hook, SetFileFn, Strategy, OPENING_MOVIE_SUFFIX, SET_FILE_PATTERN},
    host::{FunctionHook, HookFactory, ScanResult},
    movies::{MoviePath, RotationState},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LifecycleState {
    /// No detour exists. The game behaves as if we weren't loaded.
    Uninstalled,

    /// Waiting for the signature scan to finish.
    Installing,

    /// The detour is live.
    Installed,

    /// The detour exists but is disabled.
    Suspended,

    /// The mod has been unloaded. Nothing happens after this.
    Unloaded,
}

struct Installation {
    state: LifecycleState,
    hook: Hook,

    /// Set when the mod was suspended while the scan was still running.
    suspend_requested: bool,
}

/// Owns everything that the detour needs.
pub struct Interceptor {
    rotation: Mutex<Option<RotationState>>,
    installation: Mutex<Installation>,
}

/// Locks `mutex` even if another thread panicked while holding it. Code in here runs on game
/// threads, so it must never panic because of a poisoned lock.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The interceptor that the detour forwards to.
static ACTIVE: Lazy<Mutex<Option<Arc<Interceptor>>>> = Lazy::new(|| Mutex::new(None));

/// Makes `interceptor` the one that receives calls from the game.
pub fn register(interceptor: &Arc<Interceptor>) {
    *lock(&ACTIVE) = Some(interceptor.clone());
}

/// Stops `interceptor` from receiving calls, if it is the active one.
pub fn unregister(interceptor: &Arc<Interceptor>) {
    let mut active = lock(&ACTIVE);

    if active
        .as_ref()
        .map_or(false, |current| Arc::ptr_eq(current, interceptor))
    {
        *active = None;
    }
}

/// The replacement for `criManaPlayer_SetFile`.
pub unsafe extern "C" fn set_file_detour(player: usize, binder: usize, path: *const c_char) {
    let interceptor = lock(&ACTIVE).clone();

    match interceptor {
        Some(interceptor) => unsafe { interceptor.on_set_file(player, binder, path) },
        None => log::error!("criManaPlayer_SetFile detour called with no active mod?!"),
    }
}

impl Interceptor {
    pub fn new(rotation: Option<RotationState>) -> Interceptor {
        Interceptor {
            rotation: Mutex::new(rotation),
            installation: Mutex::new(Installation {
                state: LifecycleState::Uninstalled,
                hook: Hook::default(),
                suspend_requested: false,
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        lock(&self.installation).state
    }

    /// Starts hooking with `strategy`. Scanning finishes in the background, so the hook may not
    /// exist when this returns.
    pub fn install(self: &Arc<Self>, strategy: Strategy, owner: &str) {
        log::debug!("Hooking criManaPlayer_SetFile with the {}.", strategy.name());

        match strategy {
            Strategy::SharedScans(shared) => {
                lock(&self.installation).state = LifecycleState::Installing;

                let hook = shared.create_hook(set_file_detour, owner);
                self.finish_install(hook);
            }

            Strategy::StartupScanner { scanner, hooks } => {
                lock(&self.installation).state = LifecycleState::Installing;

                let weak = Arc::downgrade(self);
                let base_source = scanner.clone();

                // The scanner may call back before this returns, so no locks can be held here.
                scanner.add_main_module_scan(
                    SET_FILE_PATTERN,
                    Box::new(move |result| match weak.upgrade() {
                        Some(interceptor) => {
                            interceptor.on_scan_finished(
                                result,
                                base_source.main_module_base(),
                                hooks.as_ref(),
                            );
                        }

                        None => log::debug!("Scan finished after the mod was dropped."),
                    }),
                );
            }
        }
    }

    fn on_scan_finished(&self, result: ScanResult, module_base: usize, hooks: &dyn HookFactory) {
        if !result.found {
            log::error!("Could not find criManaPlayer_SetFile.");
            self.abandon_install();
            return;
        }

        let address = module_base + result.offset;
        log::debug!("Found criManaPlayer_SetFile at {:#X}", address);

        let hook = hooks
            .create_hook(set_file_detour, address)
            .and_then(|mut hook| {
                hook.activate()?;
                Ok(hook)
            });

        match hook {
            Ok(hook) => self.finish_install(hook),
            Err(err) => {
                log::error!("Unable to hook criManaPlayer_SetFile: {err:?}");
                self.abandon_install();
            }
        }
    }

    fn abandon_install(&self) {
        let mut installation = lock(&self.installation);

        if installation.state == LifecycleState::Installing {
            installation.state = LifecycleState::Uninstalled;
            installation.suspend_requested = false;
        }
    }

    fn finish_install(&self, mut hook: Box<dyn FunctionHook>) {
        let mut installation = lock(&self.installation);

        match installation.state {
            LifecycleState::Installing if installation.suspend_requested => {
                hook.disable();
                installation.hook.set(hook);
                installation.state = LifecycleState::Suspended;
                installation.suspend_requested = false;

                log::debug!("Hooked criManaPlayer_SetFile, but left it disabled while suspended.");
            }

            LifecycleState::Installing => {
                installation.hook.set(hook);
                installation.state = LifecycleState::Installed;

                log::info!("Hooked criManaPlayer_SetFile.");
            }

            state => {
                // Most likely unloaded while the scan was running.
                hook.disable();
                log::debug!("Dropping criManaPlayer_SetFile hook made while {state:?}.");
            }
        }
    }

    /// Disables the detour without removing it.
    pub fn suspend(&self) {
        let mut installation = lock(&self.installation);

        match installation.state {
            LifecycleState::Installed => {
                installation.hook.disable();
                installation.state = LifecycleState::Suspended;
            }

            LifecycleState::Installing => installation.suspend_requested = true,

            state => log::debug!("Ignoring suspend while {state:?}."),
        }
    }

    /// Re-enables a suspended detour.
    pub fn resume(&self) {
        let mut installation = lock(&self.installation);

        match installation.state {
            LifecycleState::Suspended => {
                installation.hook.enable();
                installation.state = LifecycleState::Installed;
            }

            LifecycleState::Installing => installation.suspend_requested = false,

            state => log::debug!("Ignoring resume while {state:?}."),
        }
    }

    /// Removes the detour and frees the movie paths. Nothing can be done with the interceptor
    /// afterwards.
    pub fn unload(&self) {
        {
            let mut installation = lock(&self.installation);

            if installation.state == LifecycleState::Unloaded {
                log::debug!("Already unloaded.");
                return;
            }

            installation.hook.remove();
            installation.state = LifecycleState::Unloaded;
        }

        // Dropping the rotation frees every path we own.
        lock(&self.rotation).take();
    }

    /// Swaps in a freshly built rotation. The old one (and its paths) is dropped.
    pub fn replace_rotation(&self, rotation: RotationState) {
        // Held across the swap so that an unload can't slip in between the check and the write.
        // Lock order is always installation, then rotation.
        let installation = lock(&self.installation);

        if installation.state == LifecycleState::Unloaded {
            log::debug!("Ignoring new rotation after unload.");
            return;
        }

        *lock(&self.rotation) = Some(rotation);
    }

    /// Runs `f` with the current rotation, if there is one.
    pub fn with_rotation<T>(&self, f: impl FnOnce(&RotationState) -> T) -> Option<T> {
        lock(&self.rotation).as_ref().map(f)
    }

    fn original(&self) -> Option<SetFileFn> {
        lock(&self.installation).hook.original()
    }

    /// Handles one call to `criManaPlayer_SetFile`.
    ///
    /// # Safety
    ///
    /// `path` must be null or point to a NUL-terminated string, and the original function must be
    /// safe to call with `player` and `binder`.
    pub unsafe fn on_set_file(&self, player: usize, binder: usize, path: *const c_char) {
        let original = match self.original() {
            Some(original) => original,
            None => {
                log::error!("Hooked function called but hook is null?!");
                return;
            }
        };

        let picked =
            panic::catch_unwind(AssertUnwindSafe(|| unsafe { self.pick_replacement(path) }));

        let replacement = picked.unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "no message".to_string());

            log::error!("Panic while picking an opening movie: {message}. Keeping original.");
            None
        });

        // `replacement` stays alive until the game has copied the path.
        let target = replacement.as_ref().map_or(path, |replacement| replacement.as_ptr());

        unsafe { original(player, binder, target) };
    }

    /// Decides what to pass to the game instead of `path`. `None` means the original path.
    unsafe fn pick_replacement(&self, path: *const c_char) -> Option<CString> {
        let file = if path.is_null() {
            &[][..]
        } else {
            unsafe { CStr::from_ptr(path) }.to_bytes()
        };

        if !file.ends_with(OPENING_MOVIE_SUFFIX.as_bytes()) {
            log::debug!("Calling original function (not the opening movie).");
            return None;
        }

        log::debug!("Starting opening movie replacement.");

        let mut rotation = lock(&self.rotation);
        let rotation = rotation.as_mut()?;

        let entry = rotation.current();
        log::debug!("Picked opening movie {}.", entry.movie);

        let replacement = match &entry.path {
            MoviePath::Original if entry.movie.is_builtin() => {
                log::debug!("Keeping original opening movie.");
                None
            }

            MoviePath::Original => {
                log::error!(
                    "Attempted to play {}, but its path was missing?!",
                    entry.movie
                );
                None
            }

            MoviePath::Replacement(movie_path) => Some(movie_path.clone()),
        };

        rotation.advance();
        replacement
    }
}
