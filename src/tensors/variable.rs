//! Shared mutable variables
use super::TensorDict;
use crate::{Prng, TensorforceError};
use ndarray::{ArrayD, IxDyn};
use rand_distr::{Distribution, Normal};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

/// A named, shaped, mutable `f32` buffer shared between the module that reads it and the
/// optimizer that updates it.
///
/// Clones are handles to the same buffer. Writes (`assign`, `assign_add`) complete before they
/// return, so any read issued after a write observes it.
#[derive(Clone)]
pub struct Variable {
    name: Rc<str>,
    value: Rc<RefCell<ArrayD<f32>>>,
    trainable: bool,
}

impl Variable {
    pub fn new(name: impl AsRef<str>, value: ArrayD<f32>, trainable: bool) -> Self {
        Self {
            name: Rc::from(name.as_ref()),
            value: Rc::new(RefCell::new(value)),
            trainable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn is_trainable(&self) -> bool {
        self.trainable
    }

    pub fn shape(&self) -> Vec<usize> {
        self.value.borrow().shape().to_vec()
    }

    /// Borrow the current value.
    ///
    /// The borrow must be released before the variable is next written.
    pub fn read(&self) -> Ref<'_, ArrayD<f32>> {
        self.value.borrow()
    }

    /// Copy of the current value.
    pub fn value(&self) -> ArrayD<f32> {
        self.value.borrow().clone()
    }

    pub fn zeros_like(&self) -> ArrayD<f32> {
        ArrayD::zeros(IxDyn(&self.shape()))
    }

    /// Overwrite the value.
    ///
    /// # Errors
    /// If the new value has a different shape.
    pub fn assign(&self, value: &ArrayD<f32>) -> Result<(), TensorforceError> {
        self.check_shape(value)?;
        self.value.borrow_mut().assign(value);
        Ok(())
    }

    /// Add `delta` to the value in place.
    ///
    /// # Errors
    /// If `delta` has a different shape.
    pub fn assign_add(&self, delta: &ArrayD<f32>) -> Result<(), TensorforceError> {
        self.check_shape(delta)?;
        *self.value.borrow_mut() += delta;
        Ok(())
    }

    fn check_shape(&self, value: &ArrayD<f32>) -> Result<(), TensorforceError> {
        let shape = self.shape();
        if value.shape() == shape.as_slice() {
            Ok(())
        } else {
            Err(TensorforceError::mismatch(
                self.name(),
                "shape",
                format!("{:?}", shape),
                format!("{:?}", value.shape()),
            ))
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("shape", &self.shape())
            .field("trainable", &self.trainable)
            .finish()
    }
}

/// Registry of all variables created by a module tree.
#[derive(Debug, Default, Clone)]
pub struct VarStore {
    variables: Vec<Variable>,
}

impl VarStore {
    pub const fn new() -> Self {
        Self {
            variables: Vec::new(),
        }
    }

    /// Register a new variable with the given initial value.
    ///
    /// # Errors
    /// If a variable of the same name already exists.
    pub fn add(
        &mut self,
        name: impl AsRef<str>,
        value: ArrayD<f32>,
        trainable: bool,
    ) -> Result<Variable, TensorforceError> {
        let name = name.as_ref();
        if self.get(name).is_some() {
            return Err(TensorforceError::value(
                "VarStore",
                "name",
                name,
                "variable names must be unique",
            ));
        }
        let variable = Variable::new(name, value, trainable);
        self.variables.push(variable.clone());
        Ok(variable)
    }

    /// Register a trainable variable initialized to zero.
    ///
    /// # Errors
    /// If a variable of the same name already exists.
    pub fn zeros(
        &mut self,
        name: impl AsRef<str>,
        shape: &[usize],
    ) -> Result<Variable, TensorforceError> {
        self.add(name, ArrayD::zeros(IxDyn(shape)), true)
    }

    /// Register a trainable variable initialized from `N(0, stddev^2)`.
    ///
    /// # Errors
    /// If a variable of the same name already exists or `stddev` is invalid.
    pub fn normal(
        &mut self,
        name: impl AsRef<str>,
        shape: &[usize],
        stddev: f32,
        rng: &mut Prng,
    ) -> Result<Variable, TensorforceError> {
        let normal = Normal::new(0.0, stddev)
            .map_err(|_| TensorforceError::value("VarStore", "stddev", stddev, ">= 0.0"))?;
        let value = ArrayD::from_shape_simple_fn(IxDyn(shape), || normal.sample(rng));
        self.add(name, value, true)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name() == name)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn trainable_variables(&self) -> Vec<Variable> {
        self.variables
            .iter()
            .filter(|v| v.is_trainable())
            .cloned()
            .collect()
    }

    /// Copy of all variable values, in registration order.
    pub fn snapshot(&self) -> TensorDict<ArrayD<f32>> {
        self.variables
            .iter()
            .map(|v| (v.name().to_owned(), v.value()))
            .collect()
    }
}
