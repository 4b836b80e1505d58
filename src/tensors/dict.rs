//! Insertion-ordered tensor dictionary
use crate::TensorforceError;
use std::iter::FromIterator;

/// Mapping from names to values that iterates in insertion order.
///
/// Used uniformly for states, actions, auxiliaries, distribution parameters and deltas.
/// Iteration order is significant: batching and fan-out over actions follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDict<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for TensorDict<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> TensorDict<T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a value, replacing (in place) and returning any previous value of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => Some(std::mem::replace(v, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Get a value or fail with a missing-argument error.
    ///
    /// # Errors
    /// If there is no entry called `name`.
    pub fn require(&self, module: &str, name: &str) -> Result<&T, TensorforceError> {
        self.get(name)
            .ok_or_else(|| TensorforceError::required(module, name))
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        let position = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(position).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries.iter_mut().map(|(n, v)| (n.as_str(), v))
    }

    /// Whether both dictionaries have exactly the same key set (in any order).
    pub fn same_keys<U>(&self, other: &TensorDict<U>) -> bool {
        self.len() == other.len() && self.keys().all(|name| other.contains_key(name))
    }

    /// Apply a function to every value, keeping names and order.
    pub fn fmap<U, F>(&self, mut f: F) -> TensorDict<U>
    where
        F: FnMut(&T) -> U,
    {
        self.entries
            .iter()
            .map(|(n, v)| (n.clone(), f(v)))
            .collect()
    }

    /// Apply a fallible function to every (name, value) pair, keeping names and order.
    ///
    /// # Errors
    /// The first error returned by `f`.
    pub fn try_fmap<U, E, F>(&self, mut f: F) -> Result<TensorDict<U>, E>
    where
        F: FnMut(&str, &T) -> Result<U, E>,
    {
        self.entries
            .iter()
            .map(|(n, v)| Ok((n.clone(), f(n, v)?)))
            .collect()
    }

    /// Apply a fallible function to values of the same name in `self` and `other`.
    ///
    /// The result follows the order of `self`.
    ///
    /// # Errors
    /// If the key sets differ, or the first error returned by `f`.
    pub fn try_zip_map<U, V, F>(
        &self,
        other: &TensorDict<U>,
        argument: &str,
        mut f: F,
    ) -> Result<TensorDict<V>, TensorforceError>
    where
        F: FnMut(&str, &T, &U) -> Result<V, TensorforceError>,
    {
        if !self.same_keys(other) {
            return Err(TensorforceError::mismatch(
                "TensorDict",
                argument,
                self.keys().collect::<Vec<_>>().join(","),
                other.keys().collect::<Vec<_>>().join(","),
            ));
        }
        self.try_fmap(|name, value| {
            let other_value = other.get(name).ok_or_else(|| {
                TensorforceError::required("TensorDict", format!("{}/{}", argument, name))
            })?;
            f(name, value, other_value)
        })
    }
}

impl<K: Into<String>, T> FromIterator<(K, T)> for TensorDict<T> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
    {
        let mut dict = Self::new();
        for (name, value) in iter {
            dict.insert(name, value);
        }
        dict
    }
}

impl<T> IntoIterator for TensorDict<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
