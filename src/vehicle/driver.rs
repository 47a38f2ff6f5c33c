/// The behaviour strategy injected into a [Vehicle].
///
/// Replaces a vehicle-class hierarchy: a driver only shapes the automaton's
/// parameters and observes the vehicle's lifecycle, it does not own state
/// the simulation depends on.
///
/// [Vehicle]: crate::Vehicle
pub trait Driver: Send + Sync {
    /// The velocity cap for this tick, given the current edge's limit in
    /// cells per tick.
    fn max_velocity(&self, edge_max_velocity: u32) -> u32;

    /// The probability to decelerate by one cell this tick.
    fn dawdle_probability(&self) -> f64;

    /// Called once when the vehicle enters the network.
    fn on_spawn(&mut self) {}

    /// Called once when the vehicle leaves the network.
    fn on_despawn(&mut self) {}
}

/// The standard Nagel-Schreckenberg driver: obeys the street's speed limit
/// up to a personal maximum and dawdles with a fixed probability.
#[derive(Clone, Copy, Debug)]
pub struct BasicDriver {
    max_velocity: u32,
    dawdle_probability: f64,
}

impl BasicDriver {
    /// Creates a driver with the given dawdle probability and no personal
    /// velocity cap. Probabilities outside `[0, 1]` are clamped.
    pub fn new(dawdle_probability: f64) -> Self {
        if !(0.0..=1.0).contains(&dawdle_probability) {
            log::warn!("dawdle probability {dawdle_probability} clamped to [0, 1]");
        }
        Self {
            max_velocity: u32::MAX,
            dawdle_probability: dawdle_probability.clamp(0.0, 1.0),
        }
    }

    /// Limits the driver to a personal maximum velocity in cells per tick.
    pub fn with_max_velocity(mut self, max_velocity: u32) -> Self {
        self.max_velocity = max_velocity;
        self
    }

    /// Samples a population of drivers whose dawdle probabilities follow a
    /// normal distribution with the given mean and standard deviation,
    /// clamped to `[0, 1]`.
    pub fn randomised(count: usize, mean: f64, stddev: f64, seed: u64) -> Vec<BasicDriver> {
        use rand::SeedableRng;
        use rand_distr::Distribution;

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        let distr = rand_distr::Normal::new(mean, stddev).expect("Invalid standard deviation");
        (0..count)
            .map(|_| BasicDriver::new(distr.sample(&mut rng).clamp(0.0, 1.0)))
            .collect()
    }
}

impl Driver for BasicDriver {
    fn max_velocity(&self, edge_max_velocity: u32) -> u32 {
        u32::min(self.max_velocity, edge_max_velocity)
    }

    fn dawdle_probability(&self) -> f64 {
        self.dawdle_probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_dawdle_probability() {
        assert_eq!(BasicDriver::new(2.0).dawdle_probability(), 1.0);
        assert_eq!(BasicDriver::new(-0.5).dawdle_probability(), 0.0);
    }

    #[test]
    fn respects_personal_and_edge_limit() {
        let driver = BasicDriver::new(0.0).with_max_velocity(3);
        assert_eq!(driver.max_velocity(5), 3);
        assert_eq!(driver.max_velocity(2), 2);
    }
}
