//! Distribution configuration and its resolution per action.
use super::{Bernoulli, Beta, Categorical, Distribution, Gaussian};
use crate::specs::{TensorSpec, TensorType};
use crate::tensors::VarStore;
use crate::{Prng, TensorforceError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Distribution family.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionType {
    Bernoulli,
    Categorical,
    Gaussian,
    Beta,
}

impl DistributionType {
    /// Default family for an action spec.
    pub const fn default_for(spec: &TensorSpec) -> Self {
        match spec.dtype {
            TensorType::Bool => Self::Bernoulli,
            TensorType::Int => Self::Categorical,
            TensorType::Float if spec.is_bounded() => Self::Beta,
            TensorType::Float => Self::Gaussian,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Bernoulli => "bernoulli",
            Self::Categorical => "categorical",
            Self::Gaussian => "gaussian",
            Self::Beta => "beta",
        }
    }
}

/// How the Gaussian standard deviation is obtained.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StddevMode {
    /// Predicted from the embedding by a linear head.
    Predicted,
    /// A state-independent trainable variable.
    Global,
}

impl Default for StddevMode {
    fn default() -> Self {
        Self::Predicted
    }
}

/// How Gaussian samples are mapped into a bounded action range.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundedTransform {
    Tanh,
    Clipping,
}

impl Default for BoundedTransform {
    fn default() -> Self {
        Self::Tanh
    }
}

/// Partially specified distribution fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionFields {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stddev_mode: Option<StddevMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounded_transform: Option<BoundedTransform>,
}

impl DistributionFields {
    /// Override the fields set in `other`.
    fn update(&mut self, other: &Self) {
        if other.distribution.is_some() {
            self.distribution = other.distribution;
        }
        if other.stddev_mode.is_some() {
            self.stddev_mode = other.stddev_mode;
        }
        if other.bounded_transform.is_some() {
            self.bounded_transform = other.bounded_transform;
        }
    }
}

/// A distribution given by family name alone or by fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DistributionSpec {
    Type(DistributionType),
    Fields(DistributionFields),
}

/// Distributions by action type (`bool`, `int`, `float`) or by action name.
///
/// An entry for the action name takes precedence over the entry for its type.
/// A family name replaces everything set so far while fields override one by one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistributionsConfig(pub BTreeMap<String, DistributionSpec>);

impl DistributionsConfig {
    /// Resolve the distribution of an action.
    ///
    /// # Errors
    /// If a field does not apply to the resolved family.
    pub fn resolve(
        &self,
        name: &str,
        spec: &TensorSpec,
    ) -> Result<DistributionConfig, TensorforceError> {
        let type_key = spec.dtype.to_string();
        let mut fields = DistributionFields::default();
        for key in [type_key.as_str(), name] {
            match self.0.get(key) {
                Some(DistributionSpec::Type(distribution)) => {
                    fields = DistributionFields {
                        distribution: Some(*distribution),
                        ..DistributionFields::default()
                    };
                }
                Some(DistributionSpec::Fields(other)) => fields.update(other),
                None => {}
            }
        }
        let distribution = fields
            .distribution
            .unwrap_or_else(|| DistributionType::default_for(spec));
        debug!("action {}: {} distribution", name, distribution.name());
        let config = match distribution {
            DistributionType::Gaussian => DistributionConfig::Gaussian(GaussianConfig {
                stddev_mode: fields.stddev_mode.unwrap_or_default(),
                bounded_transform: fields.bounded_transform.unwrap_or_default(),
            }),
            other => {
                if fields.stddev_mode.is_some() {
                    return Err(TensorforceError::invalid(other.name(), "stddev_mode"));
                }
                if fields.bounded_transform.is_some() {
                    return Err(TensorforceError::invalid(other.name(), "bounded_transform"));
                }
                match other {
                    DistributionType::Bernoulli => DistributionConfig::Bernoulli,
                    DistributionType::Categorical => DistributionConfig::Categorical,
                    _ => DistributionConfig::Beta,
                }
            }
        };
        Ok(config)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianConfig {
    pub stddev_mode: StddevMode,
    pub bounded_transform: BoundedTransform,
}

/// Fully resolved distribution configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionConfig {
    Bernoulli,
    Categorical,
    Gaussian(GaussianConfig),
    Beta,
}

impl DistributionConfig {
    /// Build the distribution for an action.
    ///
    /// Variables are created under `<scope>/<name>_distribution`.
    ///
    /// # Errors
    /// If the distribution does not support the action spec or the embedding.
    pub fn build(
        &self,
        scope: &str,
        name: &str,
        action_spec: &TensorSpec,
        embedding_spec: &TensorSpec,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Box<dyn Distribution>, TensorforceError> {
        let path = format!("{}/{}_distribution", scope, name);
        let spec = action_spec.clone();
        Ok(match self {
            Self::Bernoulli => Box::new(Bernoulli::new(&path, spec, embedding_spec, vs, rng)?),
            Self::Categorical => Box::new(Categorical::new(&path, spec, embedding_spec, vs, rng)?),
            Self::Gaussian(config) => Box::new(Gaussian::new(
                &path,
                spec,
                embedding_spec,
                *config,
                vs,
                rng,
            )?),
            Self::Beta => Box::new(Beta::new(&path, spec, embedding_spec, vs, rng)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TensorSpec::bool([2]), DistributionType::Bernoulli)]
    #[case(TensorSpec::int([], 3), DistributionType::Categorical)]
    #[case(TensorSpec::float([1]), DistributionType::Gaussian)]
    #[case(TensorSpec::bounded_float([1], -1.0, 1.0), DistributionType::Beta)]
    fn default_family(#[case] spec: TensorSpec, #[case] expected: DistributionType) {
        assert_eq!(DistributionType::default_for(&spec), expected);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = DistributionsConfig::default();
        assert_eq!(
            config.resolve("a", &TensorSpec::float([])).unwrap(),
            DistributionConfig::Gaussian(GaussianConfig::default())
        );
    }

    #[test]
    fn name_overrides_type_by_field() {
        let config: DistributionsConfig = serde_json::from_str(
            r#"{
                "float": {"type": "gaussian", "stddev_mode": "global"},
                "steer": {"bounded_transform": "clipping"}
            }"#,
        )
        .unwrap();
        let spec = TensorSpec::bounded_float([], -1.0, 1.0);
        assert_eq!(
            config.resolve("steer", &spec).unwrap(),
            DistributionConfig::Gaussian(GaussianConfig {
                stddev_mode: StddevMode::Global,
                bounded_transform: BoundedTransform::Clipping,
            })
        );
        assert_eq!(
            config.resolve("other", &spec).unwrap(),
            DistributionConfig::Gaussian(GaussianConfig {
                stddev_mode: StddevMode::Global,
                bounded_transform: BoundedTransform::Tanh,
            })
        );
    }

    #[test]
    fn name_string_replaces_type_fields() {
        let config: DistributionsConfig = serde_json::from_str(
            r#"{"float": {"type": "gaussian", "stddev_mode": "global"}, "throttle": "beta"}"#,
        )
        .unwrap();
        let spec = TensorSpec::bounded_float([], 0.0, 1.0);
        assert_eq!(
            config.resolve("throttle", &spec).unwrap(),
            DistributionConfig::Beta
        );
    }

    #[test]
    fn gaussian_field_on_other_family_fails() {
        let config: DistributionsConfig =
            serde_json::from_str(r#"{"int": {"stddev_mode": "global"}}"#).unwrap();
        assert_eq!(
            config.resolve("a", &TensorSpec::int([], 2)),
            Err(TensorforceError::invalid("categorical", "stddev_mode"))
        );
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(serde_json::from_str::<DistributionsConfig>(r#"{"a": {"size": 3}}"#).is_err());
    }
}
