//! The mod object that the loader drives: loading, suspending, resuming, unloading and config
//! changes.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    gateway::{self, Interceptor, LifecycleState},
    hook::Strategy,
    host::ModContext,
    logging,
    movies::{RotationState, MOVIES_FOLDER},
    settings::{Config, OpeningMovie},
};

pub struct Mod {
    context: ModContext,
    config: Config,

    /// `None` if our own directory couldn't be found. The mod does nothing in that case.
    movies_dir: Option<PathBuf>,

    interceptor: Arc<Interceptor>,
    rng: StdRng,
}

impl Mod {
    /// Creates the mod and starts hooking the game.
    pub fn new(context: ModContext) -> Mod {
        Mod::with_rng(context, StdRng::from_entropy())
    }

    /// Creates the mod using `rng` for every shuffle.
    pub fn with_rng(context: ModContext, mut rng: StdRng) -> Mod {
        let config = context.config.clone();

        logging::init(context.logger.clone(), &context.info.name, config.log_level);
        log::info!("Cargo package version is {}", env!("CARGO_PKG_VERSION"));

        let movies_dir = match context.loader.directory_for_mod_id(&context.info.id) {
            Some(dir) => Some(dir.join(MOVIES_FOLDER)),
            None => {
                log::error!(
                    "Unable to find the directory for {}. This mod won't work.",
                    context.info.id
                );
                None
            }
        };

        let rotation = movies_dir.as_deref().map(|movies_dir| {
            let mut rotation = build_rotation(&config, movies_dir, &mut rng);

            if config.shuffle_order {
                rotation.randomise_start();
            }

            rotation
        });

        let interceptor = Arc::new(Interceptor::new(rotation));

        if movies_dir.is_some() {
            gateway::register(&interceptor);

            match Strategy::select(context.loader.as_ref(), context.hooks.clone()) {
                Ok(strategy) => interceptor.install(strategy, &context.info.name),
                Err(err) => log::error!("{err}"),
            }
        }

        Mod {
            context,
            config,
            movies_dir,
            interceptor,
            rng,
        }
    }

    pub fn can_suspend(&self) -> bool {
        true
    }

    pub fn can_unload(&self) -> bool {
        true
    }

    pub fn suspend(&self) {
        self.interceptor.suspend();
    }

    pub fn resume(&self) {
        self.interceptor.resume();
    }

    /// Removes the hook and frees the movie list. The mod can't be used again afterwards.
    pub fn unload(&self) {
        self.interceptor.unload();
        gateway::unregister(&self.interceptor);
    }

    /// Applies new settings from the loader.
    pub fn configuration_updated(&mut self, config: Config) {
        if self.state() == LifecycleState::Unloaded {
            log::debug!("Ignoring config update after unload.");
            return;
        }

        self.config = config;
        logging::set_level(self.config.log_level);

        log::debug!("Config Updated: Applying");

        if let Some(movies_dir) = self.movies_dir.as_deref() {
            let rotation = build_rotation(&self.config, movies_dir, &mut self.rng);
            self.interceptor.replace_rotation(rotation);
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.interceptor.state()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn info(&self) -> &crate::host::ModInfo {
        &self.context.info
    }

    /// The movie that will replace the opening next time it plays.
    pub fn upcoming_movie(&self) -> Option<OpeningMovie> {
        self.interceptor
            .with_rotation(|rotation| rotation.current().movie)
    }
}

fn build_rotation(config: &Config, movies_dir: &Path, rng: &mut StdRng) -> RotationState {
    RotationState::build(
        &config.slots(),
        config.shuffle_order,
        Path::exists,
        movies_dir,
        StdRng::seed_from_u64(rng.gen()),
    )
}
