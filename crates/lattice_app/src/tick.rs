//! Fixed-timestep tick loop.
//!
//! Each tick runs every system once and then purges the entities removed
//! during that run:
//!
//! 1. Advance the clock by the tick duration.
//! 2. `World::run(time, delta)`.
//! 3. `World::clean()`.
//! 4. Advance the tick counter.

use std::time::{Duration, Instant};

use lattice_world::{World, WorldError};
use tracing::{debug, info, warn};

/// Configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

/// Drives a [`World`] at a fixed rate.
#[derive(Debug)]
pub struct TickLoop {
    tick_id: u64,
    /// Simulation time in seconds, passed to systems as `time`.
    time: f64,
    config: TickConfig,
    world: World,
}

impl TickLoop {
    #[must_use]
    pub fn new(config: TickConfig, world: World) -> Self {
        Self {
            tick_id: 0,
            time: 0.0,
            config,
            world,
        }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Run one tick and return how many entities were purged.
    ///
    /// # Errors
    ///
    /// Propagates a failed clean pass.
    pub fn tick(&mut self, dt: f64) -> Result<usize, WorldError> {
        self.tick_id += 1;
        self.time += dt;

        debug!(
            tick_id = self.tick_id,
            dt,
            systems = self.world.systems().len(),
            "tick start"
        );
        self.world.run(self.time, dt);
        let purged = self.world.clean()?;

        debug!(
            tick_id = self.tick_id,
            entities = self.world.entity_count(),
            purged,
            "tick done"
        );
        Ok(purged)
    }

    /// Run the loop for the configured number of ticks, or indefinitely.
    ///
    /// # Errors
    ///
    /// Stops at the first failed tick.
    pub fn run(&mut self) -> Result<(), WorldError> {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            self.tick(tick_duration.as_secs_f64())?;

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}
