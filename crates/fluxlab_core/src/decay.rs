//! Stochastic decay of a particle ensemble with cumulative dose tracking.
//!
//! The ensemble holds `⌊mass × 100⌋` particles scattered uniformly over the
//! unit square. Every frame each live particle takes a random step and then
//! decays with probability
//!
//! ```text
//! p(f) = λ · f / 200        (λ = ln 2 / half_life, f = frame index)
//! ```
//!
//! This is a teaching linearisation that grows with the frame index. It is
//! not the exponential law `1 − exp(−λ·t)` and is kept as is.
//!
//! Each decay adds `dose_factor · mass · 0.01` to the frame's dose. Dead
//! particles stay in the ensemble, frozen where they decayed.
//!
//! Masses that would need more than [`MAX_PARTICLES`] particles are rejected.

use crate::error::{ensure_finite, invalid, reserve, Result};
use crate::material::DecayMaterial;
use crate::runner::{run_to_completion, CancelFlag, RunProgress, SteppedRunner};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecaySettings {
    pub frame_count: usize,
    /// Denominator of the per-frame decay probability.
    pub probability_divisor: f64,
    /// Half-width of the uniform random step on each axis.
    pub jitter: f64,
    /// Dose per decay is `dose_factor · mass · dose_scale`.
    pub dose_scale: f64,
}

impl Default for DecaySettings {
    fn default() -> Self {
        Self {
            frame_count: 200,
            probability_divisor: 200.0,
            jitter: 0.05,
            dose_scale: 0.01,
        }
    }
}

impl DecaySettings {
    fn validate(&self) -> Result<()> {
        ensure_finite("probability_divisor", self.probability_divisor)?;
        ensure_finite("jitter", self.jitter)?;
        ensure_finite("dose_scale", self.dose_scale)?;
        if self.probability_divisor <= 0.0 {
            return Err(invalid("probability_divisor must be positive"));
        }
        if self.jitter < 0.0 {
            return Err(invalid("jitter must be non-negative"));
        }
        if self.dose_scale < 0.0 {
            return Err(invalid("dose_scale must be non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub alive: bool,
}

/// Append-only `(time_step, cumulative_dose)` series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoseTrace {
    entries: Vec<(usize, f64)>,
}

impl DoseTrace {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self {
            entries: reserve("dose trace entries", capacity)?,
        })
    }

    /// Appends an entry. Both the step and the dose must not go backwards.
    pub fn push(&mut self, time_step: usize, cumulative_dose: f64) -> Result<()> {
        if let Some(&(last_step, last_dose)) = self.entries.last() {
            if time_step < last_step || cumulative_dose < last_dose {
                return Err(invalid(format!(
                    "dose trace must be non-decreasing: ({last_step}, {last_dose}) -> ({time_step}, {cumulative_dose})"
                )));
            }
        }
        self.entries.push((time_step, cumulative_dose));
        Ok(())
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn final_dose(&self) -> f64 {
        self.entries.last().map_or(0.0, |&(_, dose)| dose)
    }
}

/// Ensemble state and dose after one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayFrame {
    pub frame: usize,
    pub particles: Vec<Particle>,
    pub alive_count: usize,
    /// Decay events in this frame (the counter reading).
    pub decays: usize,
    pub dose_increment: f64,
    pub cumulative_dose: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayRun {
    pub material: DecayMaterial,
    pub mass: f64,
    pub particle_count: usize,
    pub frames: Vec<DecayFrame>,
    pub dose_trace: DoseTrace,
}

/// Largest ensemble a single run may hold (a mass of 1000 g).
pub const MAX_PARTICLES: usize = 100_000;

/// Number of particles simulated for a given mass, `⌊mass × 100⌋`.
pub fn particle_count(mass: f64) -> Result<usize> {
    let scaled = (mass * 100.0).floor();
    if !(scaled >= 0.0) {
        return Err(invalid(format!(
            "mass must be finite and non-negative, got {mass}"
        )));
    }
    if scaled > MAX_PARTICLES as f64 {
        return Err(invalid(format!(
            "mass = {mass} g needs more than {MAX_PARTICLES} particles"
        )));
    }
    Ok(scaled as usize)
}

pub struct DecaySimulator<R: Rng> {
    material: DecayMaterial,
    mass: f64,
    settings: DecaySettings,
    decay_constant: f64,
    rng: R,
    particles: Vec<Particle>,
    dose_trace: DoseTrace,
    cumulative_dose: f64,
    frame: usize,
}

impl<R: Rng> DecaySimulator<R> {
    pub fn new(material: DecayMaterial, mass: f64, settings: DecaySettings, mut rng: R) -> Result<Self> {
        material.validate()?;
        settings.validate()?;
        ensure_finite("mass", mass)?;
        if mass <= 0.0 {
            return Err(invalid(format!("mass must be positive, got {mass}")));
        }

        let count = particle_count(mass)?;
        let dose_trace = DoseTrace::with_capacity(settings.frame_count)?;
        let particles = (0..count)
            .map(|_| Particle {
                x: rng.gen::<f64>(),
                y: rng.gen::<f64>(),
                alive: true,
            })
            .collect();

        Ok(Self {
            decay_constant: material.decay_constant(),
            material,
            mass,
            settings,
            rng,
            particles,
            dose_trace,
            cumulative_dose: 0.0,
            frame: 0,
        })
    }

    pub fn decay_probability(&self, frame: usize) -> f64 {
        self.decay_constant * frame as f64 / self.settings.probability_divisor
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn dose_trace(&self) -> &DoseTrace {
        &self.dose_trace
    }

    pub fn frames_completed(&self) -> usize {
        self.frame
    }

    pub fn is_finished(&self) -> bool {
        self.frame >= self.settings.frame_count
    }

    pub fn alive_count(&self) -> usize {
        self.particles.iter().filter(|p| p.alive).count()
    }

    /// Advances the ensemble by one frame and returns its snapshot.
    pub fn step_frame(&mut self) -> Result<DecayFrame> {
        let probability = self.decay_probability(self.frame);
        let jitter = self.settings.jitter;
        let dose_per_decay = self.material.dose_factor * self.mass * self.settings.dose_scale;

        let mut decays = 0usize;
        for particle in self.particles.iter_mut().filter(|p| p.alive) {
            particle.x = (particle.x + self.rng.gen_range(-jitter..=jitter)).clamp(0.0, 1.0);
            particle.y = (particle.y + self.rng.gen_range(-jitter..=jitter)).clamp(0.0, 1.0);
            if self.rng.gen::<f64>() < probability {
                particle.alive = false;
                decays += 1;
            }
        }

        let dose_increment = decays as f64 * dose_per_decay;
        self.cumulative_dose += dose_increment;
        self.dose_trace.push(self.frame, self.cumulative_dose)?;

        let snapshot = DecayFrame {
            frame: self.frame,
            particles: self.particles.clone(),
            alive_count: self.alive_count(),
            decays,
            dose_increment,
            cumulative_dose: self.cumulative_dose,
        };
        self.frame += 1;
        Ok(snapshot)
    }
}

/// Stepped decay run: one unit of work is one frame.
pub struct DecayRunner<R: Rng> {
    simulator: DecaySimulator<R>,
    frames: Vec<DecayFrame>,
}

impl<R: Rng> DecayRunner<R> {
    pub fn new(simulator: DecaySimulator<R>) -> Result<Self> {
        info!(
            "decay run for {} ({} g, {} particles, {} frames, lambda = {:e} 1/s)",
            simulator.material.name,
            simulator.mass,
            simulator.particles.len(),
            simulator.settings.frame_count,
            simulator.decay_constant
        );
        let frames = reserve("decay frames", simulator.settings.frame_count)?;
        Ok(Self { simulator, frames })
    }

    pub fn simulator(&self) -> &DecaySimulator<R> {
        &self.simulator
    }

    pub fn frames(&self) -> &[DecayFrame] {
        &self.frames
    }
}

impl<R: Rng> SteppedRunner for DecayRunner<R> {
    type Output = DecayRun;

    fn run_steps(&mut self, batch_size: usize) -> Result<RunProgress> {
        for _ in 0..batch_size {
            if self.is_done() {
                break;
            }
            let frame = self.simulator.step_frame()?;
            self.frames.push(frame);
        }
        debug!(
            "decay batch done: frame {}/{}, dose {:e}",
            self.simulator.frame, self.simulator.settings.frame_count, self.simulator.cumulative_dose
        );
        Ok(self.progress())
    }

    fn is_done(&self) -> bool {
        self.simulator.is_finished()
    }

    fn progress(&self) -> RunProgress {
        RunProgress {
            done: self.is_done(),
            completed: self.simulator.frame,
            total: self.simulator.settings.frame_count,
            metric: self.simulator.cumulative_dose,
        }
    }

    fn into_result(self) -> DecayRun {
        let simulator = self.simulator;
        info!(
            "decay run finished: {} of {} particles alive, cumulative dose {:e}",
            simulator.alive_count(),
            simulator.particles.len(),
            simulator.cumulative_dose
        );
        DecayRun {
            particle_count: simulator.particles.len(),
            material: simulator.material,
            mass: simulator.mass,
            frames: self.frames,
            dose_trace: simulator.dose_trace,
        }
    }
}

/// Runs a registry material with an injected random source.
pub fn simulate_decay<R: Rng>(
    material_name: &str,
    mass: f64,
    settings: DecaySettings,
    rng: R,
) -> Result<DecayRun> {
    simulate_material(DecayMaterial::lookup(material_name)?, mass, settings, rng, None)
}

/// Same as [`simulate_decay`] with a `StdRng` seeded from `seed`.
pub fn simulate_decay_seeded(
    material_name: &str,
    mass: f64,
    settings: DecaySettings,
    seed: u64,
) -> Result<DecayRun> {
    simulate_decay(material_name, mass, settings, StdRng::seed_from_u64(seed))
}

pub fn simulate_material<R: Rng>(
    material: DecayMaterial,
    mass: f64,
    settings: DecaySettings,
    rng: R,
    cancel: Option<&CancelFlag>,
) -> Result<DecayRun> {
    let simulator = DecaySimulator::new(material, mass, settings, rng)?;
    run_to_completion(DecayRunner::new(simulator)?, cancel)
}
