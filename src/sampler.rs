use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

use crate::metric::SampleRate;

/// What to do with a single observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sampling {
    Drop,
    /// Send it as-is, full rate metrics carry no `|@rate` suffix.
    Emit,
    /// Send it annotated with the rate so the collector can scale it back up.
    EmitSampled(SampleRate),
}

impl Sampling {
    pub fn should_emit(&self) -> bool {
        !matches!(self, Sampling::Drop)
    }
    pub fn annotation(&self) -> Option<SampleRate> {
        match self {
            Sampling::EmitSampled(rate) => Some(*rate),
            _ => None,
        }
    }
}

/// Decides which observations get sent. The random source is injected so sampling can be made
/// deterministic.
pub struct Sampler {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl Sampler {
    pub fn new<R: RngCore + Send + 'static>(rng: R) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn decide<R: Into<SampleRate>>(&self, rate: R) -> Sampling {
        let rate = rate.into();
        if rate >= SampleRate::ALWAYS {
            return Sampling::Emit;
        }
        if rate <= SampleRate::NEVER {
            return Sampling::Drop;
        }
        let draw: f64 = self.rng.lock().gen();
        if draw < rate.get() {
            Sampling::EmitSampled(rate)
        } else {
            Sampling::Drop
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler").finish_non_exhaustive()
    }
}
