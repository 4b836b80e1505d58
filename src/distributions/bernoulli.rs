//! Bernoulli distribution over boolean actions.
use super::{
    check_action_dtype, is_deterministic, wrong_parameters, Distribution, LinearHead, Parameters,
};
use crate::specs::{TensorSpec, TensorType};
use crate::tensors::{Tensor, TensorDict, VarStore, Variable};
use crate::utils::numeric::{log_sigmoid, logsumexp_last, sigmoid};
use crate::{Prng, TensorforceError};
use ndarray::{ArrayD, Axis, Zip};
use rand::Rng;

/// Bernoulli distribution with a value per outcome.
///
/// The probability of `true` is `sigmoid(value_true - value_false)`.
#[derive(Debug)]
pub struct Bernoulli {
    action_spec: TensorSpec,
    head: LinearHead,
}

impl Bernoulli {
    /// # Errors
    /// If the action is not boolean or the embedding is not a float vector.
    pub fn new(
        path: &str,
        action_spec: TensorSpec,
        embedding_spec: &TensorSpec,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        check_action_dtype(&action_spec, "bernoulli", TensorType::Bool)?;
        let mut shape = action_spec.shape.clone();
        shape.push(2);
        let head = LinearHead::new(&format!("{}/action_values", path), embedding_spec, shape, vs, rng)?;
        Ok(Self { action_spec, head })
    }
}

/// Logit of `true`, `value_true - value_false`.
fn logits(action_values: &ArrayD<f32>) -> ArrayD<f32> {
    let last = Axis(action_values.ndim() - 1);
    action_values.index_axis(last, 1).to_owned() - action_values.index_axis(last, 0)
}

fn action_values(parameters: &Parameters) -> Result<&ArrayD<f32>, TensorforceError> {
    match parameters {
        Parameters::Bernoulli { action_values } => Ok(action_values),
        other => Err(wrong_parameters("bernoulli", other)),
    }
}

fn bool_action<'a>(action: &'a Tensor) -> Result<&'a ArrayD<bool>, TensorforceError> {
    action
        .as_bool()
        .ok_or_else(|| TensorforceError::dtype("bernoulli", "action", action.dtype()))
}

impl Distribution for Bernoulli {
    fn action_spec(&self) -> &TensorSpec {
        &self.action_spec
    }

    fn parametrize(
        &self,
        embedding: &ArrayD<f32>,
        _conditions: &TensorDict<Tensor>,
    ) -> Result<Parameters, TensorforceError> {
        Ok(Parameters::Bernoulli {
            action_values: self.head.forward(embedding)?,
        })
    }

    fn sample(
        &self,
        parameters: &Parameters,
        temperature: f32,
        rng: &mut Prng,
    ) -> Result<Tensor, TensorforceError> {
        let logits = logits(action_values(parameters)?);
        let action = if is_deterministic(temperature) {
            logits.mapv(|l| l >= 0.0)
        } else {
            logits.mapv(|l| rng.gen::<f32>() < sigmoid(l / temperature))
        };
        Ok(Tensor::Bool(action))
    }

    fn log_probability(
        &self,
        parameters: &Parameters,
        action: &Tensor,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        let logits = logits(action_values(parameters)?);
        let action = bool_action(action)?;
        if logits.shape() != action.shape() {
            return Err(TensorforceError::mismatch(
                "bernoulli",
                "action shape",
                format!("{:?}", logits.shape()),
                format!("{:?}", action.shape()),
            ));
        }
        Ok(Zip::from(&logits).and(action).map_collect(|&l, &a| {
            if a {
                log_sigmoid(l)
            } else {
                log_sigmoid(-l)
            }
        }))
    }

    fn entropy(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        let logits = logits(action_values(parameters)?);
        Ok(logits.mapv(|l| {
            let p = sigmoid(l);
            -p * log_sigmoid(l) - (1.0 - p) * log_sigmoid(-l)
        }))
    }

    fn kl_divergence(
        &self,
        parameters1: &Parameters,
        parameters2: &Parameters,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        let logits1 = logits(action_values(parameters1)?);
        let logits2 = logits(action_values(parameters2)?);
        if logits1.shape() != logits2.shape() {
            return Err(TensorforceError::mismatch(
                "bernoulli",
                "parameters shape",
                format!("{:?}", logits1.shape()),
                format!("{:?}", logits2.shape()),
            ));
        }
        Ok(Zip::from(&logits1).and(&logits2).map_collect(|&l1, &l2| {
            let p = sigmoid(l1);
            p * (log_sigmoid(l1) - log_sigmoid(l2))
                + (1.0 - p) * (log_sigmoid(-l1) - log_sigmoid(-l2))
        }))
    }

    fn states_value(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        Ok(logsumexp_last(action_values(parameters)?))
    }

    fn action_value(
        &self,
        parameters: &Parameters,
        action: &Tensor,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        let values = action_values(parameters)?;
        let action = bool_action(action)?.mapv(usize::from);
        super::select_last("bernoulli", values, &action)
    }

    fn all_action_values(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        Ok(action_values(parameters)?.clone())
    }

    fn variables(&self) -> Vec<Variable> {
        self.head.variables()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array2};
    use rand::SeedableRng;

    fn bernoulli() -> (Bernoulli, VarStore) {
        let mut vs = VarStore::new();
        let mut rng = Prng::seed_from_u64(0);
        let d = Bernoulli::new(
            "policy/a_distribution",
            TensorSpec::bool([]),
            &TensorSpec::float([3]),
            &mut vs,
            &mut rng,
        )
        .unwrap();
        (d, vs)
    }

    fn params(values: [[f32; 2]; 2]) -> Parameters {
        Parameters::Bernoulli {
            action_values: arr2(&values).into_dyn(),
        }
    }

    #[test]
    fn variable_names() {
        let (_, vs) = bernoulli();
        let names: Vec<_> = vs.variables().iter().map(|v| v.name().to_owned()).collect();
        assert_eq!(
            names,
            [
                "policy/a_distribution/action_values/weights",
                "policy/a_distribution/action_values/bias"
            ]
        );
    }

    #[test]
    fn parametrize_shape() {
        let (d, _vs) = bernoulli();
        let embedding = Array2::<f32>::ones((4, 3)).into_dyn();
        let parameters = d.parametrize(&embedding, &TensorDict::new()).unwrap();
        match parameters {
            Parameters::Bernoulli { action_values } => assert_eq!(action_values.shape(), [4, 2]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn requires_bool_action() {
        let mut vs = VarStore::new();
        let mut rng = Prng::seed_from_u64(0);
        let result = Bernoulli::new(
            "d",
            TensorSpec::int([], 2),
            &TensorSpec::float([3]),
            &mut vs,
            &mut rng,
        );
        assert!(matches!(result, Err(TensorforceError::Type { .. })));
    }

    #[test]
    fn deterministic_sample_is_mode() {
        let (d, _vs) = bernoulli();
        let mut rng = Prng::seed_from_u64(1);
        let parameters = params([[0.0, 0.5], [1.0, -1.0]]);
        let action = d.sample(&parameters, 0.0, &mut rng).unwrap();
        assert_eq!(action, Tensor::Bool(arr1(&[true, false]).into_dyn()));
    }

    #[test]
    fn log_probability_closed_form() {
        let (d, _vs) = bernoulli();
        let parameters = params([[0.0, 0.0], [0.0, 2.0_f32.ln()]]);
        let action = Tensor::Bool(arr1(&[true, false]).into_dyn());
        let log_prob = d.log_probability(&parameters, &action).unwrap();
        assert!((log_prob[0] - 0.5_f32.ln()).abs() < 1e-6);
        // p(true) = 2 / 3
        assert!((log_prob[1] - (1.0_f32 / 3.0).ln()).abs() < 1e-6);
    }

    #[test]
    fn entropy_maximal_at_half() {
        let (d, _vs) = bernoulli();
        let entropy = d.entropy(&params([[0.0, 0.0], [0.0, 5.0]])).unwrap();
        assert!((entropy[0] - 2.0_f32.ln()).abs() < 1e-6);
        assert!(entropy[1] < entropy[0]);
    }

    #[test]
    fn kl_divergence_closed_form() {
        let (d, _vs) = bernoulli();
        let p = params([[0.0, 0.0], [0.0, 1.0]]);
        let q = params([[0.0, 2.0_f32.ln()], [0.0, 1.0]]);
        let kl = d.kl_divergence(&p, &q).unwrap();
        // KL(1/2 || 2/3)
        let expected = 0.5 * (0.5_f32 / (2.0 / 3.0)).ln() + 0.5 * (0.5_f32 / (1.0 / 3.0)).ln();
        assert!((kl[0] - expected).abs() < 1e-6);
        assert!(kl[1].abs() < 1e-6);
    }

    #[test]
    fn values() {
        let (d, _vs) = bernoulli();
        let parameters = params([[1.0, 2.0], [0.0, 0.0]]);
        let states_value = d.states_value(&parameters).unwrap();
        assert!((states_value[1] - 2.0_f32.ln()).abs() < 1e-6);
        let action = Tensor::Bool(arr1(&[false, true]).into_dyn());
        assert_eq!(
            d.action_value(&parameters, &action).unwrap(),
            arr1(&[1.0_f32, 0.0]).into_dyn()
        );
        assert_eq!(d.all_action_values(&parameters).unwrap().shape(), [2, 2]);
    }

    #[test]
    fn rejects_other_parameters() {
        let (d, _vs) = bernoulli();
        let parameters = Parameters::Beta {
            alpha: arr1(&[1.0_f32]).into_dyn(),
            beta: arr1(&[1.0_f32]).into_dyn(),
        };
        assert!(matches!(
            d.entropy(&parameters),
            Err(TensorforceError::Mismatch { .. })
        ));
    }
}
