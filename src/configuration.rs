//! Driver knobs loaded from the environment/a config file (SPEC_FULL.md
//! ambient-stack section): thread count, ray epsilon, RNG seed words, and
//! the path tracer's bounce/roulette parameters. Scene, camera and material
//! construction are out of scope here — those are handed in by the host as
//! opaque objects (spec.md §6), not configuration.
//!
//! Grounded on the teacher's `configuration::{ImageSettingsImpl,
//! ImageSettings, load_configuration}`: a private `*Impl` struct deserialized
//! via `config`/`serde`/`serde_aux` (so values can come from a YAML file or
//! be overridden by environment variables as numeric strings), converted
//! into a public, already-validated settings type.

use config::ConfigError;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::error::{Result, Status};
use crate::integrator::PathTracerConfig;

#[derive(Deserialize, Clone)]
struct RenderSettingsImpl {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    thread_count: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    epsilon: f64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    seed_state: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    seed_sequence: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    min_bounces: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    max_bounces: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    min_termination_probability: f64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    roulette_threshold: f64,
}

/// Validated driver configuration. `tracer_config`/`seed` map directly onto
/// `PathTracer::new` and `Rng::new`.
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub thread_count: u32,
    pub epsilon: f64,
    pub seed_state: u64,
    pub seed_sequence: u64,
    pub tracer_config: PathTracerConfig,
}

impl RenderSettings {
    fn from_impl(settings: RenderSettingsImpl) -> Result<RenderSettings> {
        if settings.thread_count < 1 {
            return Err(Status::InvalidArgument("thread_count"));
        }
        if settings.epsilon <= 0.0 || !settings.epsilon.is_finite() {
            return Err(Status::InvalidArgument("epsilon"));
        }
        if settings.min_bounces > settings.max_bounces {
            return Err(Status::InvalidArgumentCombination("min_bounces/max_bounces"));
        }
        Ok(RenderSettings {
            thread_count: settings.thread_count,
            epsilon: settings.epsilon,
            seed_state: settings.seed_state,
            seed_sequence: settings.seed_sequence,
            tracer_config: PathTracerConfig {
                min_bounces: settings.min_bounces,
                max_bounces: settings.max_bounces,
                min_termination_probability: settings.min_termination_probability,
                roulette_threshold: settings.roulette_threshold,
            },
        })
    }
}

fn map_config_error(_err: ConfigError) -> Status {
    // `config`'s error set (missing key, type mismatch, parse failure) is
    // always "inputs individually valid but jointly unusable as a whole",
    // which is exactly `InvalidArgumentCombination` in spec.md §7's
    // taxonomy.
    Status::InvalidArgumentCombination("render configuration")
}

/// Loads driver settings from `<cwd>/configuration/render.yaml`, with
/// environment variable overrides (`RENDER__THREAD_COUNT`, etc.), following
/// the teacher's `load_configuration` layering.
pub fn load_configuration() -> Result<RenderSettings> {
    let base_path = std::env::current_dir().map_err(Status::IoError)?;
    let configuration_directory = base_path.join("configuration");
    let file = config::File::from(configuration_directory.join("render.yaml"));
    let env = config::Environment::with_prefix("RENDER").separator("__");

    let settings = config::Config::builder()
        .add_source(file)
        .add_source(env)
        .build()
        .map_err(map_config_error)?;

    let parsed: RenderSettingsImpl = settings.try_deserialize().map_err(map_config_error)?;
    let result = RenderSettings::from_impl(parsed);
    if let Err(status) = &result {
        tracing::warn!(%status, "rejected render configuration");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_impl() -> RenderSettingsImpl {
        RenderSettingsImpl {
            thread_count: 4,
            epsilon: 1e-4,
            seed_state: 1,
            seed_sequence: 2,
            min_bounces: 3,
            max_bounces: 8,
            min_termination_probability: 0.05,
            roulette_threshold: 1.0,
        }
    }

    #[test]
    fn valid_settings_pass_through_unchanged() {
        let settings = RenderSettings::from_impl(valid_impl()).unwrap();
        assert_eq!(settings.thread_count, 4);
        assert_eq!(settings.tracer_config.min_bounces, 3);
        assert_eq!(settings.tracer_config.max_bounces, 8);
    }

    #[test]
    fn zero_thread_count_is_rejected() {
        let mut settings = valid_impl();
        settings.thread_count = 0;
        assert!(matches!(RenderSettings::from_impl(settings), Err(Status::InvalidArgument("thread_count"))));
    }

    #[test]
    fn nonpositive_or_nonfinite_epsilon_is_rejected() {
        let mut zero = valid_impl();
        zero.epsilon = 0.0;
        assert!(matches!(RenderSettings::from_impl(zero), Err(Status::InvalidArgument("epsilon"))));

        let mut negative = valid_impl();
        negative.epsilon = -1e-4;
        assert!(matches!(RenderSettings::from_impl(negative), Err(Status::InvalidArgument("epsilon"))));

        let mut nan = valid_impl();
        nan.epsilon = f64::NAN;
        assert!(matches!(RenderSettings::from_impl(nan), Err(Status::InvalidArgument("epsilon"))));
    }

    #[test]
    fn min_bounces_above_max_bounces_is_rejected() {
        let mut settings = valid_impl();
        settings.min_bounces = 10;
        settings.max_bounces = 5;
        assert!(matches!(
            RenderSettings::from_impl(settings),
            Err(Status::InvalidArgumentCombination("min_bounces/max_bounces"))
        ));
    }

    #[test]
    fn equal_min_and_max_bounces_is_accepted() {
        let mut settings = valid_impl();
        settings.min_bounces = 4;
        settings.max_bounces = 4;
        assert!(RenderSettings::from_impl(settings).is_ok());
    }
}
