//! Evaluation context and device parameters
//!
//! Every compute step reads its operating frequency, temperature and
//! reference impedance from an [`EvalContext`] passed by reference. A context
//! is immutable; overriding a field produces a child context with a fresh
//! [`Epoch`], so device caches keyed on the epoch can never serve data computed
//! under different conditions.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::{DEFAULT_TEMPERATURE, DEFAULT_Z_NORMAL, MAX_SHADOW_DEPTH};
use crate::error::{Error, Result};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Cache token identifying one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epoch(u64);

impl Epoch {
    /// Allocate a new, never before seen epoch
    pub fn fresh() -> Self {
        Epoch(NEXT_EPOCH.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Ambient conditions of one evaluation pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalContext {
    frequency: f64,
    temperature: f64,
    z_normal: f64,
    epoch: Epoch,
}

impl EvalContext {
    /// Create a context with a fresh epoch
    ///
    /// # Arguments
    /// * `frequency` - Operating frequency (Hz)
    /// * `temperature` - Ambient temperature (K)
    /// * `z_normal` - Reference impedance (Ohms)
    pub fn new(frequency: f64, temperature: f64, z_normal: f64) -> Self {
        Self {
            frequency,
            temperature,
            z_normal,
            epoch: Epoch::fresh(),
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn z_normal(&self) -> f64 {
        self.z_normal
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Child context at another frequency
    pub fn with_frequency(&self, frequency: f64) -> Self {
        Self::new(frequency, self.temperature, self.z_normal)
    }

    /// Child context at another temperature
    pub fn with_temperature(&self, temperature: f64) -> Self {
        Self::new(self.frequency, temperature, self.z_normal)
    }

    /// Child context with another reference impedance
    pub fn with_z_normal(&self, z_normal: f64) -> Self {
        Self::new(self.frequency, self.temperature, z_normal)
    }

    /// Same conditions, new epoch. Use after changing device parameters.
    pub fn refresh(&self) -> Self {
        Self::new(self.frequency, self.temperature, self.z_normal)
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new(0.0, DEFAULT_TEMPERATURE, DEFAULT_Z_NORMAL)
    }
}

/// Value held by a [`Parameter`]
#[derive(Clone)]
pub enum ParamValue {
    Literal(f64),
    Shadow(Rc<Parameter>),
}

/// A real-valued device parameter that either holds a value or forwards to
/// another parameter.
pub struct Parameter {
    value: RefCell<ParamValue>,
}

impl Parameter {
    pub fn new(value: f64) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(ParamValue::Literal(value)),
        })
    }

    /// Create a parameter that follows `target`
    pub fn shadowing(target: &Rc<Parameter>) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(ParamValue::Shadow(Rc::clone(target))),
        })
    }

    /// Store a literal value, dropping any shadow link
    pub fn set(&self, value: f64) {
        *self.value.borrow_mut() = ParamValue::Literal(value);
    }

    /// Follow `target` from now on
    pub fn shadow(&self, target: &Rc<Parameter>) -> Result<()> {
        if std::ptr::eq(self, Rc::as_ptr(target)) {
            return Err(Error::InvalidParameter(
                "parameter cannot shadow itself".to_string(),
            ));
        }
        *self.value.borrow_mut() = ParamValue::Shadow(Rc::clone(target));
        Ok(())
    }

    pub fn is_shadow(&self) -> bool {
        matches!(&*self.value.borrow(), ParamValue::Shadow(_))
    }

    /// Resolve the parameter value.
    ///
    /// Follows at most [`MAX_SHADOW_DEPTH`] shadow links; a longer chain is
    /// reported as [`Error::ShadowDepth`], which is how shadow cycles surface.
    pub fn get(&self) -> Result<f64> {
        let mut current = match &*self.value.borrow() {
            ParamValue::Literal(v) => return Ok(*v),
            ParamValue::Shadow(p) => Rc::clone(p),
        };
        for _ in 0..MAX_SHADOW_DEPTH {
            let next = match &*current.value.borrow() {
                ParamValue::Literal(v) => return Ok(*v),
                ParamValue::Shadow(p) => Rc::clone(p),
            };
            current = next;
        }
        Err(Error::ShadowDepth(MAX_SHADOW_DEPTH))
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.value.borrow() {
            ParamValue::Literal(v) => write!(f, "Parameter({})", v),
            ParamValue::Shadow(_) => write!(f, "Parameter(shadow)"),
        }
    }
}
