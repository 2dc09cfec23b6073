//! Built-in linear elements
//!
//! The minimal set of primitives the composition engine and the mixer need:
//! ideal N-way junctions, series and shunt-to-ground impedances (optionally
//! with a Thevenin source), and fixed data blocks.

use std::cell::Cell;
use std::rc::Rc;

use ndarray::Array2;
use num_complex::Complex64;

use crate::constants::SOURCE_FREQ_TOL;
use crate::context::{EvalContext, Parameter};
use crate::device::{ComputeMode, DataCache, Device, DeviceFlags};
use crate::error::{Error, Result};
use crate::port::DeviceId;
use crate::sdata::ScatteringData;

/// Ideal lossless N-way junction of transmission lines of equal impedance
#[derive(Debug)]
pub struct Branch {
    id: DeviceId,
    ports: usize,
    cache: DataCache,
}

impl Branch {
    pub fn new(ports: usize) -> Self {
        Self {
            id: DeviceId::next(),
            ports,
            cache: DataCache::new(),
        }
    }
}

impl Device for Branch {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn size(&self) -> usize {
        self.ports
    }

    fn compute(&self, ctx: &EvalContext, _mode: ComputeMode) -> Result<ScatteringData> {
        let n = self.ports;
        if n == 0 {
            return Ok(ScatteringData::new(0));
        }
        let t = 2.0 / n as f64;
        let s = Array2::from_shape_fn((n, n), |(i, j)| {
            if i == j {
                Complex64::new(t - 1.0, 0.0)
            } else {
                Complex64::new(t, 0.0)
            }
        });
        Ok(ScatteringData::from_s(s, ctx.z_normal()))
    }

    fn cache(&self) -> &DataCache {
        &self.cache
    }
}

/// Physical temperature of a resistive element: its own parameter if set,
/// otherwise the ambient temperature of the context.
fn element_temperature(own: &Option<Rc<Parameter>>, ctx: &EvalContext) -> Result<f64> {
    match own {
        Some(t) => t.get(),
        None => Ok(ctx.temperature()),
    }
}

/// Two-port series impedance Z = R + jX
#[derive(Debug)]
pub struct SeriesImpedance {
    id: DeviceId,
    /// Resistance (Ohms)
    pub resistance: Rc<Parameter>,
    /// Reactance (Ohms)
    pub reactance: Rc<Parameter>,
    /// Physical temperature (K); ambient if None
    pub temperature: Option<Rc<Parameter>>,
    cache: DataCache,
}

impl SeriesImpedance {
    pub fn new(resistance: f64, reactance: f64) -> Self {
        Self {
            id: DeviceId::next(),
            resistance: Parameter::new(resistance),
            reactance: Parameter::new(reactance),
            temperature: None,
            cache: DataCache::new(),
        }
    }

    /// Series resistor
    pub fn resistor(resistance: f64) -> Self {
        Self::new(resistance, 0.0)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(Parameter::new(temperature));
        self
    }
}

impl Device for SeriesImpedance {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn size(&self) -> usize {
        2
    }

    fn flags(&self) -> DeviceFlags {
        DeviceFlags::NOISY
    }

    fn compute(&self, ctx: &EvalContext, mode: ComputeMode) -> Result<ScatteringData> {
        let z0 = ctx.z_normal();
        let z = Complex64::new(self.resistance.get()?, self.reactance.get()?) / z0;
        let two = Complex64::new(2.0, 0.0);
        let denom = z + two;
        if denom.norm() == 0.0 {
            return Err(Error::InvalidParameter(
                "series impedance of -2*Z0 has no scattering matrix".to_string(),
            ));
        }

        let mut s = Array2::<Complex64>::zeros((2, 2));
        s[[0, 0]] = z / denom;
        s[[1, 1]] = z / denom;
        s[[0, 1]] = two / denom;
        s[[1, 0]] = two / denom;

        let mut data = ScatteringData::from_s(s, z0);
        if mode.wants_noise() {
            data.passive_noise(ctx.frequency(), element_temperature(&self.temperature, ctx)?);
        }
        Ok(data)
    }

    fn cache(&self) -> &DataCache {
        &self.cache
    }
}

/// Thevenin voltage source active at a single frequency
#[derive(Debug)]
pub struct Source {
    /// Open-circuit voltage phasor (V)
    voltage: Cell<Complex64>,
    /// Frequency at which the source is active (Hz)
    pub frequency: Rc<Parameter>,
}

impl Source {
    pub fn new(voltage: Complex64, frequency: f64) -> Self {
        Self {
            voltage: Cell::new(voltage),
            frequency: Parameter::new(frequency),
        }
    }

    /// Source whose frequency follows another parameter, e.g. a mixer LO
    pub fn tracking(voltage: Complex64, frequency: &Rc<Parameter>) -> Self {
        Self {
            voltage: Cell::new(voltage),
            frequency: Parameter::shadowing(frequency),
        }
    }

    pub fn voltage(&self) -> Complex64 {
        self.voltage.get()
    }

    pub fn set_voltage(&self, voltage: Complex64) {
        self.voltage.set(voltage);
    }

    /// True if the source radiates at `frequency`
    pub fn is_active_at(&self, frequency: f64) -> Result<bool> {
        let fs = self.frequency.get()?;
        Ok((frequency - fs).abs() <= SOURCE_FREQ_TOL * fs.abs().max(1.0))
    }
}

/// One-port impedance to ground, optionally with a series Thevenin source
#[derive(Debug)]
pub struct Load {
    id: DeviceId,
    /// Resistance (Ohms); None matches the context reference impedance
    pub resistance: Option<Rc<Parameter>>,
    /// Reactance (Ohms)
    pub reactance: Rc<Parameter>,
    /// Physical temperature (K); ambient if None
    pub temperature: Option<Rc<Parameter>>,
    source: Option<Source>,
    cache: DataCache,
}

impl Load {
    pub fn new(resistance: f64, reactance: f64) -> Self {
        Self {
            id: DeviceId::next(),
            resistance: Some(Parameter::new(resistance)),
            reactance: Parameter::new(reactance),
            temperature: None,
            source: None,
            cache: DataCache::new(),
        }
    }

    /// Load resistor
    pub fn resistor(resistance: f64) -> Self {
        Self::new(resistance, 0.0)
    }

    /// Load whose resistance tracks the reference impedance
    pub fn matched() -> Self {
        Self {
            id: DeviceId::next(),
            resistance: None,
            reactance: Parameter::new(0.0),
            temperature: None,
            source: None,
            cache: DataCache::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(Parameter::new(temperature));
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    fn impedance(&self, ctx: &EvalContext) -> Result<Complex64> {
        let r = match &self.resistance {
            Some(r) => r.get()?,
            None => ctx.z_normal(),
        };
        Ok(Complex64::new(r, self.reactance.get()?))
    }
}

impl Device for Load {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn size(&self) -> usize {
        1
    }

    fn flags(&self) -> DeviceFlags {
        DeviceFlags {
            noise: true,
            active: false,
            source: self.source.is_some(),
        }
    }

    fn compute(&self, ctx: &EvalContext, mode: ComputeMode) -> Result<ScatteringData> {
        let z0 = ctx.z_normal();
        let z = self.impedance(ctx)?;
        let denom = z + z0;
        if denom.norm() == 0.0 {
            return Err(Error::InvalidParameter(
                "load impedance of -Z0 has no scattering matrix".to_string(),
            ));
        }

        let mut data = ScatteringData::from_s(Array2::from_elem((1, 1), (z - z0) / denom), z0);
        if let Some(src) = &self.source {
            if src.is_active_at(ctx.frequency())? {
                // Wave launched into a matched termination by the Thevenin source
                data.b[0] = src.voltage() * z0.sqrt() / denom;
            }
        }
        if mode.wants_noise() {
            data.passive_noise(ctx.frequency(), element_temperature(&self.temperature, ctx)?);
        }
        Ok(data)
    }

    fn cache(&self) -> &DataCache {
        &self.cache
    }
}

/// Frequency-independent scattering data with its own normalization
#[derive(Debug)]
pub struct FixedData {
    id: DeviceId,
    data: ScatteringData,
    cache: DataCache,
}

impl FixedData {
    pub fn new(data: ScatteringData) -> Self {
        Self {
            id: DeviceId::next(),
            data,
            cache: DataCache::new(),
        }
    }
}

impl Device for FixedData {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn size(&self) -> usize {
        self.data.size()
    }

    fn flags(&self) -> DeviceFlags {
        let zero = Complex64::new(0.0, 0.0);
        DeviceFlags {
            noise: self.data.c.iter().any(|c| *c != zero),
            active: false,
            source: self.data.b.iter().any(|b| *b != zero),
        }
    }

    fn compute(&self, _ctx: &EvalContext, mode: ComputeMode) -> Result<ScatteringData> {
        let mut data = self.data.clone();
        if !mode.wants_noise() {
            data.c.fill(Complex64::new(0.0, 0.0));
        }
        Ok(data)
    }

    fn cache(&self) -> &DataCache {
        &self.cache
    }
}
