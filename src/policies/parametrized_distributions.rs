//! Policy of independent action distributions on a shared state embedding
use super::{ActOutput, PolicyInputs};
use crate::distributions::{Distribution, DistributionsConfig, Parameters};
use crate::networks::layers::Dense;
use crate::networks::{LayeredNetwork, Network, NetworkConfig};
use crate::parameters::{Parameter, ParameterBounds, ParameterConfig};
use crate::specs::{TensorSpec, TensorType};
use crate::tensors::{Argument, Tensor, TensorDict, VarStore, Variable};
use crate::{Prng, TensorforceError};
use log::debug;
use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const NAME: &str = "ParametrizedDistributions";

/// Source of state value estimates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "InferStateValueRepr", into = "InferStateValueRepr")]
pub enum InferStateValue {
    /// Separate linear value head on the embedding. Configured as `false`.
    Disabled,
    /// Maximum over the values of all actions. Discrete actions only.
    ActionValues,
    /// Value implied by the distribution parameters.
    Distribution,
}

impl Default for InferStateValue {
    fn default() -> Self {
        Self::Disabled
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum InferStateValueRepr {
    Flag(bool),
    Mode(InferMode),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum InferMode {
    ActionValues,
    Distribution,
}

impl TryFrom<InferStateValueRepr> for InferStateValue {
    type Error = String;

    fn try_from(repr: InferStateValueRepr) -> Result<Self, Self::Error> {
        match repr {
            InferStateValueRepr::Flag(false) => Ok(Self::Disabled),
            InferStateValueRepr::Flag(true) => {
                Err(r#"expected false, "action-values" or "distribution""#.to_owned())
            }
            InferStateValueRepr::Mode(InferMode::ActionValues) => Ok(Self::ActionValues),
            InferStateValueRepr::Mode(InferMode::Distribution) => Ok(Self::Distribution),
        }
    }
}

impl From<InferStateValue> for InferStateValueRepr {
    fn from(value: InferStateValue) -> Self {
        match value {
            InferStateValue::Disabled => Self::Flag(false),
            InferStateValue::ActionValues => Self::Mode(InferMode::ActionValues),
            InferStateValue::Distribution => Self::Mode(InferMode::Distribution),
        }
    }
}

/// Sampling temperature, global or per action name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemperatureConfig {
    Global(ParameterConfig),
    /// Actions without an entry have temperature 0.
    PerAction(BTreeMap<String, ParameterConfig>),
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self::Global(ParameterConfig::Value(0.0))
    }
}

impl From<f64> for TemperatureConfig {
    fn from(value: f64) -> Self {
        Self::Global(value.into())
    }
}

impl TemperatureConfig {
    fn build(
        &self,
        scope: &str,
        actions_spec: &TensorDict<TensorSpec>,
    ) -> Result<Temperatures, TensorforceError> {
        let bounds = ParameterBounds::float().with_min(0.0);
        match self {
            Self::Global(config) => Ok(Temperatures::Global(
                config.build(&format!("{}/temperature", scope), bounds)?,
            )),
            Self::PerAction(configs) => {
                if let Some(unknown) = configs.keys().find(|name| !actions_spec.contains_key(name)) {
                    return Err(TensorforceError::value(
                        scope,
                        "temperature",
                        unknown,
                        "action name",
                    ));
                }
                let zero = ParameterConfig::Value(0.0);
                actions_spec
                    .try_fmap(|action, _| {
                        configs
                            .get(action)
                            .unwrap_or(&zero)
                            .build(&format!("{}/{}_temperature", scope, action), bounds)
                    })
                    .map(Temperatures::PerAction)
            }
        }
    }
}

#[derive(Debug)]
enum Temperatures {
    Global(Box<dyn Parameter>),
    PerAction(TensorDict<Box<dyn Parameter>>),
}

/// Configuration for [`ParametrizedDistributions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParametrizedDistributionsConfig {
    /// State embedding network.
    pub network: NetworkConfig,
    /// Distributions by action type or name.
    pub distributions: DistributionsConfig,
    /// Sampling temperature (float >= 0).
    pub temperature: TemperatureConfig,
    pub infer_state_value: InferStateValue,
}

impl ParametrizedDistributionsConfig {
    /// Build the policy with its variables created under `name`.
    ///
    /// # Args
    /// * `name` - Variable scope of the policy.
    /// * `states_spec` - Per-instance state specs, by state name.
    /// * `actions_spec` - Per-instance action specs, by action name.
    /// * `vs` - Variable store.
    /// * `rng` - Random number generator for variable initialization.
    ///
    /// # Errors
    /// If the network output is not float, a distribution does not support its action,
    /// or a temperature is invalid.
    pub fn build(
        &self,
        name: &str,
        states_spec: &TensorDict<TensorSpec>,
        actions_spec: &TensorDict<TensorSpec>,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<ParametrizedDistributions, TensorforceError> {
        if actions_spec.is_empty() {
            return Err(TensorforceError::required(NAME, "actions_spec"));
        }
        for (action, spec) in actions_spec.iter() {
            spec.validate(action)?;
        }

        let network = self
            .network
            .build(&format!("{}/network", name), states_spec, vs, rng)?;
        let embedding_spec = network.output_spec().clone();
        if embedding_spec.dtype != TensorType::Float {
            return Err(TensorforceError::dtype(
                NAME,
                "network output",
                embedding_spec.dtype,
            ));
        }

        let distributions = actions_spec.try_fmap(|action, spec| {
            self.distributions
                .resolve(action, spec)?
                .build(name, action, spec, &embedding_spec, vs, rng)
        })?;

        let value = match self.infer_state_value {
            InferStateValue::Disabled => Some(Dense::new(
                &format!("{}/states_value", name),
                embedding_spec.size(),
                0,
                false,
                vs,
                rng,
            )?),
            InferStateValue::ActionValues | InferStateValue::Distribution => None,
        };

        let temperatures = self.temperature.build(name, actions_spec)?;
        debug!(
            "policy {}: {} actions on embedding {}, state value {:?}",
            name,
            actions_spec.len(),
            embedding_spec,
            self.infer_state_value
        );
        Ok(ParametrizedDistributions {
            actions_spec: actions_spec.clone(),
            network,
            distributions,
            temperatures,
            infer_state_value: self.infer_state_value,
            value,
        })
    }
}

/// Policy parametrizing an independent distribution per action from a shared state embedding.
///
/// Actions are conditionally independent given the embedding: every operation computes the
/// embedding once and fans it out to all action distributions.
#[derive(Debug)]
pub struct ParametrizedDistributions {
    actions_spec: TensorDict<TensorSpec>,
    network: LayeredNetwork,
    distributions: TensorDict<Box<dyn Distribution>>,
    temperatures: Temperatures,
    infer_state_value: InferStateValue,
    /// State value head; present iff `infer_state_value` is disabled.
    value: Option<Dense>,
}

impl ParametrizedDistributions {
    pub const fn actions_spec(&self) -> &TensorDict<TensorSpec> {
        &self.actions_spec
    }

    pub const fn infer_state_value(&self) -> InferStateValue {
        self.infer_state_value
    }

    /// Per-instance specs of the internal (recurrent) state.
    pub fn internals_spec(&self) -> TensorDict<TensorSpec> {
        self.network.internals_spec()
    }

    /// Per-instance initial internal state.
    pub fn internals_init(&self) -> TensorDict<ArrayD<f32>> {
        self.network.internals_init()
    }

    pub fn max_past_horizon(&self, on_policy: bool) -> usize {
        self.network.max_past_horizon(on_policy)
    }

    pub fn past_horizon(&self, on_policy: bool) -> usize {
        self.network.past_horizon(on_policy)
    }

    /// Variables of the network, the distributions and the value head.
    pub fn variables(&self) -> Vec<Variable> {
        let mut variables = self.network.variables();
        for distribution in self.distributions.values() {
            variables.extend(distribution.variables());
        }
        if let Some(value) = &self.value {
            variables.extend(value.variables());
        }
        variables
    }

    /// Current sampling temperature of each action.
    ///
    /// Advances stochastic temperature schedules.
    #[allow(clippy::cast_possible_truncation)]
    pub fn temperatures(&mut self, timestep: u64, rng: &mut Prng) -> TensorDict<f32> {
        match &mut self.temperatures {
            Temperatures::Global(temperature) => {
                let temperature = temperature.value(timestep, rng) as f32;
                self.distributions
                    .keys()
                    .map(|name| (name, temperature))
                    .collect()
            }
            Temperatures::PerAction(temperatures) => temperatures
                .iter_mut()
                .map(|(name, temperature)| (name, temperature.value(timestep, rng) as f32))
                .collect(),
        }
    }

    /// Select actions with the configured temperatures, or with temperature 0 if deterministic.
    ///
    /// # Errors
    /// If the inputs do not match the policy.
    pub fn act(
        &mut self,
        inputs: PolicyInputs,
        deterministic: bool,
        timestep: u64,
        rng: &mut Prng,
        return_internals: bool,
    ) -> Result<ActOutput, TensorforceError> {
        let temperatures = if deterministic {
            self.distributions.fmap(|_| 0.0_f32)
        } else {
            self.temperatures(timestep, rng)
        };
        self.sample_actions(inputs, &temperatures, rng, return_internals)
    }

    /// Sample actions with the given temperature per action.
    ///
    /// # Errors
    /// If the inputs do not match the policy or a temperature is missing.
    pub fn sample_actions(
        &self,
        inputs: PolicyInputs,
        temperatures: &TensorDict<f32>,
        rng: &mut Prng,
        return_internals: bool,
    ) -> Result<ActOutput, TensorforceError> {
        let (embedding, internals) = self.embedding(inputs, return_internals)?;
        let parameters = self.parametrize(&embedding, inputs.auxiliaries)?;
        let actions = self.fan_out(&parameters, |name, distribution, parameters| {
            let temperature = *temperatures.require(NAME, name)?;
            distribution.sample(parameters, temperature, rng)
        })?;
        Ok(ActOutput { actions, internals })
    }

    /// Log probability of each action element, by action name.
    ///
    /// # Errors
    /// If the inputs or the actions do not match the policy.
    pub fn log_probabilities(
        &self,
        inputs: PolicyInputs,
        actions: &TensorDict<Tensor>,
    ) -> Result<TensorDict<ArrayD<f32>>, TensorforceError> {
        self.check_keys(actions, "actions")?;
        let parameters = self.kldiv_reference(inputs)?;
        self.fan_out(&parameters, |name, distribution, parameters| {
            distribution.log_probability(parameters, actions.require(NAME, name)?)
        })
    }

    /// Entropy of each action element's distribution, by action name.
    ///
    /// # Errors
    /// If the inputs do not match the policy.
    pub fn entropies(
        &self,
        inputs: PolicyInputs,
    ) -> Result<TensorDict<ArrayD<f32>>, TensorforceError> {
        let parameters = self.kldiv_reference(inputs)?;
        self.fan_out(&parameters, |_, distribution, parameters| {
            distribution.entropy(parameters)
        })
    }

    /// Distribution parameters, for later use as a [`Self::kl_divergences`] reference.
    ///
    /// # Errors
    /// If the inputs do not match the policy.
    pub fn kldiv_reference(
        &self,
        inputs: PolicyInputs,
    ) -> Result<TensorDict<Parameters>, TensorforceError> {
        let (embedding, _) = self.embedding(inputs, false)?;
        self.parametrize(&embedding, inputs.auxiliaries)
    }

    /// `KL(current || reference)` per action element, by action name.
    ///
    /// The reference is a fixed snapshot from [`Self::kldiv_reference`].
    ///
    /// # Errors
    /// If the inputs or the reference do not match the policy.
    pub fn kl_divergences(
        &self,
        inputs: PolicyInputs,
        reference: &TensorDict<Parameters>,
    ) -> Result<TensorDict<ArrayD<f32>>, TensorforceError> {
        self.check_keys(reference, "reference")?;
        let parameters = self.kldiv_reference(inputs)?;
        self.fan_out(&parameters, |name, distribution, parameters| {
            distribution.kl_divergence(parameters, reference.require(NAME, name)?)
        })
    }

    /// State value.
    ///
    /// # Args
    /// * `reduced` - Average each action's values over the action elements.
    /// * `return_per_action` - Return values per action name instead of their average.
    ///
    /// The value head only supports a reduced value over all actions.
    ///
    /// # Errors
    /// If the inputs do not match the policy or the reduction is not supported.
    pub fn states_value(
        &self,
        inputs: PolicyInputs,
        reduced: bool,
        return_per_action: bool,
    ) -> Result<Argument, TensorforceError> {
        match &self.value {
            Some(value) => {
                if !reduced || return_per_action {
                    return Err(TensorforceError::invalid("policy.states_value", "reduced"));
                }
                let (embedding, _) = self.embedding(inputs, false)?;
                Ok(Tensor::Float(value.forward(&embedding)?).into())
            }
            None => reduce(
                "policy.states_value",
                self.states_values(inputs)?,
                reduced,
                return_per_action,
            ),
        }
    }

    /// State value of each action element, by action name.
    ///
    /// # Errors
    /// If the inputs do not match the policy, or values are inferred from action values and
    /// some action is continuous.
    pub fn states_values(
        &self,
        inputs: PolicyInputs,
    ) -> Result<TensorDict<ArrayD<f32>>, TensorforceError> {
        if self.infer_state_value == InferStateValue::ActionValues {
            return Ok(self.all_actions_values(inputs)?.fmap(max_last));
        }
        let parameters = self.kldiv_reference(inputs)?;
        self.fan_out(&parameters, |_, distribution, parameters| {
            distribution.states_value(parameters)
        })
    }

    /// Value of the given actions, reduced like [`Self::states_value`].
    ///
    /// # Errors
    /// If the inputs or the actions do not match the policy, or both `reduced` and
    /// `return_per_action` are false.
    pub fn actions_value(
        &self,
        inputs: PolicyInputs,
        actions: &TensorDict<Tensor>,
        reduced: bool,
        return_per_action: bool,
    ) -> Result<Argument, TensorforceError> {
        reduce(
            "policy.actions_value",
            self.actions_values(inputs, actions)?,
            reduced,
            return_per_action,
        )
    }

    /// Value of each action element, by action name.
    ///
    /// # Errors
    /// If the inputs or the actions do not match the policy.
    pub fn actions_values(
        &self,
        inputs: PolicyInputs,
        actions: &TensorDict<Tensor>,
    ) -> Result<TensorDict<ArrayD<f32>>, TensorforceError> {
        self.check_keys(actions, "actions")?;
        let parameters = self.kldiv_reference(inputs)?;
        self.fan_out(&parameters, |name, distribution, parameters| {
            distribution.action_value(parameters, actions.require(NAME, name)?)
        })
    }

    /// Values of every possible action, with a trailing axis over the actions, by action name.
    ///
    /// # Errors
    /// If some action is continuous or the inputs do not match the policy.
    pub fn all_actions_values(
        &self,
        inputs: PolicyInputs,
    ) -> Result<TensorDict<ArrayD<f32>>, TensorforceError> {
        if self.actions_spec.values().any(|spec| !spec.dtype.is_discrete()) {
            return Err(TensorforceError::value(
                NAME,
                "infer_state_value",
                "action-values",
                "action types not bool/int",
            ));
        }
        let parameters = self.kldiv_reference(inputs)?;
        self.fan_out(&parameters, |_, distribution, parameters| {
            distribution.all_action_values(parameters)
        })
    }

    fn embedding(
        &self,
        inputs: PolicyInputs,
        return_internals: bool,
    ) -> Result<(ArrayD<f32>, Option<TensorDict<Tensor>>), TensorforceError> {
        let output = self.network.apply(
            inputs.states,
            inputs.horizons,
            inputs.internals,
            return_internals,
        )?;
        match output.embedding {
            Tensor::Float(embedding) => Ok((embedding, output.internals)),
            other => Err(TensorforceError::dtype(
                NAME,
                "network output",
                other.dtype(),
            )),
        }
    }

    fn parametrize(
        &self,
        embedding: &ArrayD<f32>,
        auxiliaries: &TensorDict<TensorDict<Tensor>>,
    ) -> Result<TensorDict<Parameters>, TensorforceError> {
        if let Some(unknown) = auxiliaries
            .keys()
            .find(|name| !self.distributions.contains_key(name))
        {
            return Err(TensorforceError::value(
                NAME,
                "auxiliaries",
                unknown,
                "action name",
            ));
        }
        let no_conditions = TensorDict::new();
        self.distributions.try_fmap(|name, distribution| {
            distribution.parametrize(embedding, auxiliaries.get(name).unwrap_or(&no_conditions))
        })
    }

    /// Apply `f` to each distribution and its parameters.
    fn fan_out<U, F>(
        &self,
        parameters: &TensorDict<Parameters>,
        mut f: F,
    ) -> Result<TensorDict<U>, TensorforceError>
    where
        F: FnMut(&str, &dyn Distribution, &Parameters) -> Result<U, TensorforceError>,
    {
        self.distributions
            .try_zip_map(parameters, "parameters", |name, distribution, parameters| {
                f(name, &**distribution, parameters)
            })
    }

    fn check_keys<T>(&self, values: &TensorDict<T>, argument: &str) -> Result<(), TensorforceError> {
        if self.distributions.same_keys(values) {
            Ok(())
        } else {
            Err(TensorforceError::mismatch(
                NAME,
                argument,
                self.distributions.keys().collect::<Vec<_>>().join(","),
                values.keys().collect::<Vec<_>>().join(","),
            ))
        }
    }
}

/// Maximum over the last axis.
fn max_last(values: &ArrayD<f32>) -> ArrayD<f32> {
    let last = Axis(values.ndim() - 1);
    values.fold_axis(last, f32::NEG_INFINITY, |&max, &x| max.max(x))
}

/// Mean over all axes except the batch axis.
#[allow(clippy::cast_precision_loss)]
fn mean_per_instance(values: &ArrayD<f32>) -> ArrayD<f32> {
    let count: usize = values.shape().iter().skip(1).product();
    let mut sum = values.clone();
    while sum.ndim() > 1 {
        sum = sum.sum_axis(Axis(1));
    }
    sum / count.max(1) as f32
}

/// Reduce per-action values to the requested form.
#[allow(clippy::cast_precision_loss)]
fn reduce(
    name: &str,
    values: TensorDict<ArrayD<f32>>,
    reduced: bool,
    return_per_action: bool,
) -> Result<Argument, TensorforceError> {
    if !reduced && !return_per_action {
        return Err(TensorforceError::invalid(name, "return_per_action"));
    }
    let values = if reduced {
        values.fmap(mean_per_instance)
    } else {
        values
    };
    if return_per_action {
        let values: TensorDict<Tensor> = values
            .into_iter()
            .map(|(action, value)| (action, Tensor::Float(value)))
            .collect();
        return Ok(values.into());
    }

    let count = values.len() as f32;
    let total = values
        .into_iter()
        .map(|(_, value)| value)
        .reduce(|total, value| total + value)
        .ok_or_else(|| TensorforceError::required(name, "actions"))?;
    Ok(Tensor::Float(total / count).into())
}
