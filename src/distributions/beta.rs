//! Beta distribution over bounded float actions.
use super::{
    check_action_dtype, is_deterministic, wrong_parameters, Distribution, LinearHead, Parameters,
};
use crate::specs::{TensorSpec, TensorType};
use crate::tensors::{Tensor, TensorDict, VarStore, Variable};
use crate::utils::numeric::{digamma, ln_beta, softplus, EPSILON};
use crate::{Prng, TensorforceError};
use ndarray::{ArrayD, Zip};
use rand::Rng;
use rand_distr::Beta as BetaSampler;

/// Beta distribution scaled to the action range `[min_value, max_value]`.
///
/// Both concentrations are `softplus(head) + 1`, making the density unimodal.
#[derive(Debug)]
pub struct Beta {
    action_spec: TensorSpec,
    alpha: LinearHead,
    beta: LinearHead,
    min_value: f64,
    max_value: f64,
}

impl Beta {
    /// # Errors
    /// If the action is not a bounded float or the embedding is not a float vector.
    pub fn new(
        path: &str,
        action_spec: TensorSpec,
        embedding_spec: &TensorSpec,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        check_action_dtype(&action_spec, "beta", TensorType::Float)?;
        let (min_value, max_value) = match (action_spec.min_value, action_spec.max_value) {
            (Some(min), Some(max)) => (min, max),
            _ => {
                return Err(TensorforceError::value(
                    "beta",
                    "action_spec",
                    &action_spec,
                    "requires min_value and max_value",
                ))
            }
        };
        let shape = action_spec.shape.clone();
        let alpha = LinearHead::new(
            &format!("{}/alpha", path),
            embedding_spec,
            shape.clone(),
            vs,
            rng,
        )?;
        let beta = LinearHead::new(&format!("{}/beta", path), embedding_spec, shape, vs, rng)?;
        Ok(Self {
            action_spec,
            alpha,
            beta,
            min_value,
            max_value,
        })
    }

    fn range(&self) -> f64 {
        self.max_value - self.min_value
    }

    /// Map a unit-interval value into the action range.
    #[allow(clippy::cast_possible_truncation)]
    fn scale(&self, x: f64) -> f32 {
        (self.min_value + self.range() * x) as f32
    }

    /// Log-density of an action, including the change of scale.
    fn log_density(&self, alpha: f64, beta: f64, action: f64) -> f64 {
        let eps = f64::from(EPSILON);
        let x = ((action - self.min_value) / self.range()).clamp(eps, 1.0 - eps);
        (alpha - 1.0) * x.ln() + (beta - 1.0) * (1.0 - x).ln()
            - ln_beta(alpha, beta)
            - self.range().ln()
    }
}

fn parameters(parameters: &Parameters) -> Result<(&ArrayD<f32>, &ArrayD<f32>), TensorforceError> {
    match parameters {
        Parameters::Beta { alpha, beta } => Ok((alpha, beta)),
        other => Err(wrong_parameters("beta", other)),
    }
}

fn mean(alpha: f64, beta: f64) -> f64 {
    alpha / (alpha + beta)
}

impl Distribution for Beta {
    fn action_spec(&self) -> &TensorSpec {
        &self.action_spec
    }

    fn parametrize(
        &self,
        embedding: &ArrayD<f32>,
        _conditions: &TensorDict<Tensor>,
    ) -> Result<Parameters, TensorforceError> {
        let concentration = |x: f32| softplus(x) + 1.0;
        Ok(Parameters::Beta {
            alpha: self.alpha.forward(embedding)?.mapv(concentration),
            beta: self.beta.forward(embedding)?.mapv(concentration),
        })
    }

    fn sample(
        &self,
        parameters: &Parameters,
        temperature: f32,
        rng: &mut Prng,
    ) -> Result<Tensor, TensorforceError> {
        let (alpha, beta) = self::parameters(parameters)?;
        if is_deterministic(temperature) {
            let action = Zip::from(alpha)
                .and(beta)
                .map_collect(|&a, &b| self.scale(mean(a.into(), b.into())));
            return Ok(Tensor::Float(action));
        }
        let eps = f64::from(EPSILON);
        let temperature = f64::from(temperature);
        let mut values = Vec::with_capacity(alpha.len());
        for (&a, &b) in alpha.iter().zip(beta) {
            let sampler = BetaSampler::new(f64::from(a), f64::from(b))
                .map_err(|err| TensorforceError::value("beta", "parameters", err, "alpha, beta > 0"))?;
            let mean = mean(a.into(), b.into());
            let x: f64 = rng.sample(sampler);
            values.push(self.scale((mean + temperature * (x - mean)).clamp(eps, 1.0 - eps)));
        }
        Ok(Tensor::Float(ArrayD::from_shape_vec(alpha.raw_dim(), values)?))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn log_probability(
        &self,
        parameters: &Parameters,
        action: &Tensor,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        let (alpha, beta) = self::parameters(parameters)?;
        let action = action
            .as_float()
            .ok_or_else(|| TensorforceError::dtype("beta", "action", action.dtype()))?;
        if action.shape() != alpha.shape() {
            return Err(TensorforceError::mismatch(
                "beta",
                "action shape",
                format!("{:?}", alpha.shape()),
                format!("{:?}", action.shape()),
            ));
        }
        Ok(Zip::from(alpha)
            .and(beta)
            .and(action)
            .map_collect(|&a, &b, &x| self.log_density(a.into(), b.into(), x.into()) as f32))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn entropy(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        let (alpha, beta) = self::parameters(parameters)?;
        let log_range = self.range().ln();
        Ok(Zip::from(alpha).and(beta).map_collect(|&a, &b| {
            let (a, b) = (f64::from(a), f64::from(b));
            (ln_beta(a, b) - (a - 1.0) * digamma(a) - (b - 1.0) * digamma(b)
                + (a + b - 2.0) * digamma(a + b)
                + log_range) as f32
        }))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn kl_divergence(
        &self,
        parameters1: &Parameters,
        parameters2: &Parameters,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        let (alpha1, beta1) = self::parameters(parameters1)?;
        let (alpha2, beta2) = self::parameters(parameters2)?;
        if alpha1.shape() != alpha2.shape() {
            return Err(TensorforceError::mismatch(
                "beta",
                "parameters shape",
                format!("{:?}", alpha1.shape()),
                format!("{:?}", alpha2.shape()),
            ));
        }
        Ok(Zip::from(alpha1)
            .and(beta1)
            .and(alpha2)
            .and(beta2)
            .map_collect(|&a1, &b1, &a2, &b2| {
                let (a1, b1, a2, b2) = (f64::from(a1), f64::from(b1), f64::from(a2), f64::from(b2));
                (ln_beta(a2, b2) - ln_beta(a1, b1)
                    + (a1 - a2) * digamma(a1)
                    + (b1 - b2) * digamma(b1)
                    + (a2 - a1 + b2 - b1) * digamma(a1 + b1)) as f32
            }))
    }

    /// Log-density of the mean action.
    #[allow(clippy::cast_possible_truncation)]
    fn states_value(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        let (alpha, beta) = self::parameters(parameters)?;
        Ok(Zip::from(alpha).and(beta).map_collect(|&a, &b| {
            let (a, b) = (f64::from(a), f64::from(b));
            let action = self.min_value + self.range() * mean(a, b);
            self.log_density(a, b, action) as f32
        }))
    }

    fn action_value(
        &self,
        parameters: &Parameters,
        action: &Tensor,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        self.log_probability(parameters, action)
    }

    fn all_action_values(&self, _parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        Err(TensorforceError::invalid("beta", "all_action_values"))
    }

    fn variables(&self) -> Vec<Variable> {
        let mut variables = self.alpha.variables();
        variables.extend(self.beta.variables());
        variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array2};
    use rand::SeedableRng;

    fn beta(min_value: f64, max_value: f64) -> (Beta, VarStore) {
        let mut vs = VarStore::new();
        let mut rng = Prng::seed_from_u64(0);
        let d = Beta::new(
            "policy/a_distribution",
            TensorSpec::bounded_float([], min_value, max_value),
            &TensorSpec::float([3]),
            &mut vs,
            &mut rng,
        )
        .unwrap();
        (d, vs)
    }

    fn params(alpha: [f32; 2], beta: [f32; 2]) -> Parameters {
        Parameters::Beta {
            alpha: arr1(&alpha).into_dyn(),
            beta: arr1(&beta).into_dyn(),
        }
    }

    #[test]
    fn requires_bounds() {
        let mut vs = VarStore::new();
        let mut rng = Prng::seed_from_u64(0);
        let result = Beta::new(
            "d",
            TensorSpec::float([]),
            &TensorSpec::float([3]),
            &mut vs,
            &mut rng,
        );
        assert!(matches!(result, Err(TensorforceError::Value { .. })));
    }

    #[test]
    fn concentrations_above_one() {
        let (d, _vs) = beta(0.0, 1.0);
        let embedding = Array2::from_elem((4, 3), -50.0_f32).into_dyn();
        match d.parametrize(&embedding, &TensorDict::new()).unwrap() {
            Parameters::Beta { alpha, beta } => {
                assert_eq!(alpha.shape(), [4]);
                assert!(alpha.iter().chain(&beta).all(|&c| c >= 1.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn deterministic_sample_is_mean() {
        let (d, _vs) = beta(-2.0, 2.0);
        let mut rng = Prng::seed_from_u64(0);
        let action = d.sample(&params([1.0, 3.0], [1.0, 1.0]), 0.0, &mut rng).unwrap();
        assert_eq!(action, Tensor::Float(arr1(&[0.0_f32, 1.0]).into_dyn()));
    }

    #[test]
    fn samples_strictly_inside_range() {
        let (d, _vs) = beta(1.0, 3.0);
        let mut rng = Prng::seed_from_u64(0);
        let parameters = params([1.0, 50.0], [50.0, 1.0]);
        for _ in 0..50 {
            let action = d.sample(&parameters, 1.0, &mut rng).unwrap();
            assert!(action
                .as_float()
                .unwrap()
                .iter()
                .all(|&a| a > 1.0 && a < 3.0));
        }
    }

    #[test]
    fn uniform_closed_forms() {
        // Beta(1, 1) on [0, 2] is uniform with density 1/2
        let (d, _vs) = beta(0.0, 2.0);
        let parameters = params([1.0, 1.0], [1.0, 1.0]);
        let action = Tensor::Float(arr1(&[0.5_f32, 1.5]).into_dyn());
        let log_prob = d.log_probability(&parameters, &action).unwrap();
        assert!(log_prob.iter().all(|l| (l - 0.5_f32.ln()).abs() < 1e-5));
        let entropy = d.entropy(&parameters).unwrap();
        assert!(entropy.iter().all(|e| (e - 2.0_f32.ln()).abs() < 1e-5));
        assert!(d
            .kl_divergence(&parameters, &parameters)
            .unwrap()
            .iter()
            .all(|k| k.abs() < 1e-6));
    }

    #[test]
    fn kl_divergence_closed_form() {
        // KL(Beta(2, 1) || Beta(1, 1)) = ln 2 - 1/2
        let (d, _vs) = beta(0.0, 1.0);
        let p = params([2.0, 2.0], [1.0, 1.0]);
        let q = params([1.0, 1.0], [1.0, 1.0]);
        let kl = d.kl_divergence(&p, &q).unwrap();
        assert!((kl[0] - (2.0_f32.ln() - 0.5)).abs() < 1e-5);
    }

    #[test]
    fn log_probability_closed_form() {
        // Beta(2, 1) has density 2x
        let (d, _vs) = beta(0.0, 1.0);
        let parameters = params([2.0, 2.0], [1.0, 1.0]);
        let action = Tensor::Float(arr1(&[0.25_f32, 0.75]).into_dyn());
        let log_prob = d.log_probability(&parameters, &action).unwrap();
        assert!((log_prob[0] - 0.5_f32.ln()).abs() < 1e-5);
        assert!((log_prob[1] - 1.5_f32.ln()).abs() < 1e-5);
    }
}
