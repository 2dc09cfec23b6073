//! Harmonic-balance mixer
//!
//! A [`Mixer`] joins J nonlinear junctions to three linear networks:
//!
//! - the bias network (J ports) seen by the junctions at DC,
//! - the IF network (J + P_IF ports) seen at the IF frequency,
//! - the RF network (J + P_RF ports) seen at every other sideband.
//!
//! In each network the first J ports face the junctions. After
//! [`Mixer::balance`] has found the large-signal operating point, the mixer
//! behaves as a linear [`Device`] whose ports are the open IF ports at
//! sideband 0 and the open RF ports at sidebands `-H..-1, 1..H` (see
//! [`HarmonicPorts`]).

mod analyze;
mod balance;
pub mod junction;
pub mod ports;

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use ndarray::Array1;
use num_complex::Complex64;

use crate::connect::Circuit;
use crate::context::{EvalContext, Parameter};
use crate::device::{AsDevice, ComputeMode, DataCache, Device, DeviceFlags, DeviceRef};
use crate::elements::Load;
use crate::error::{Error, Result};
use crate::port::{DeviceId, Port};
use crate::sdata::ScatteringData;

pub use balance::{BalanceOptions, BalanceReport, BalanceStart};
pub use junction::{Junction, JunctionRef};
pub use ports::HarmonicPorts;

use balance::{Balancer, HarmonicNetworks};

/// Operating point an accepted balance belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    lo_frequency: f64,
    harmonics: usize,
}

/// Multi-junction harmonic-balance mixer
pub struct Mixer {
    id: DeviceId,
    lo_frequency: Rc<Parameter>,
    harmonics: usize,
    bias: Option<DeviceRef>,
    if_circuit: Option<DeviceRef>,
    rf_circuit: Option<DeviceRef>,
    junctions: Vec<JunctionRef>,
    /// Balance terminators of the open RF ports, by open-port index
    terminators: Vec<Option<DeviceRef>>,
    rf_terminated: bool,
    options: BalanceOptions,
    balancer: RefCell<Balancer>,
    terminated_rf: RefCell<Option<Rc<Circuit>>>,
    balanced: Cell<Option<Snapshot>>,
    cache: DataCache,
}

impl Mixer {
    /// Mixer pumped at `lo_frequency` (Hz), tracking `harmonics` LO harmonics
    pub fn new(lo_frequency: f64, harmonics: usize) -> Self {
        Self {
            id: DeviceId::next(),
            lo_frequency: Parameter::new(lo_frequency),
            harmonics,
            bias: None,
            if_circuit: None,
            rf_circuit: None,
            junctions: Vec::new(),
            terminators: Vec::new(),
            rf_terminated: false,
            options: BalanceOptions::default(),
            balancer: RefCell::new(Balancer::new()),
            terminated_rf: RefCell::new(None),
            balanced: Cell::new(None),
            cache: DataCache::new(),
        }
    }

    /// Drop everything derived from the topology
    fn invalidate(&mut self) {
        *self.terminated_rf.get_mut() = None;
        self.balancer.get_mut().invalidate();
        self.balanced.set(None);
        self.cache.clear();
    }

    /// LO frequency parameter; sources may track it with
    /// [`Source::tracking`](crate::elements::Source::tracking)
    pub fn lo_frequency(&self) -> &Rc<Parameter> {
        &self.lo_frequency
    }

    /// Change the LO frequency. A balanced mixer becomes stale, but its state
    /// remains a starting point for the next balance.
    pub fn set_lo_frequency(&mut self, frequency: f64) {
        self.lo_frequency.set(frequency);
        self.cache.clear();
    }

    pub fn harmonics(&self) -> usize {
        self.harmonics
    }

    pub fn set_harmonics(&mut self, harmonics: usize) {
        if harmonics != self.harmonics {
            self.harmonics = harmonics;
            self.invalidate();
        }
    }

    pub fn set_bias_circuit(&mut self, device: &impl AsDevice) {
        self.bias = Some(device.as_device());
        self.invalidate();
    }

    pub fn set_if_circuit(&mut self, device: &impl AsDevice) {
        self.if_circuit = Some(device.as_device());
        self.invalidate();
    }

    pub fn set_rf_circuit(&mut self, device: &impl AsDevice) {
        self.rf_circuit = Some(device.as_device());
        self.invalidate();
    }

    /// Append a junction; it faces port `junction_count()` of each network
    pub fn add_junction(&mut self, junction: JunctionRef) {
        self.junctions.push(junction);
        self.invalidate();
    }

    pub fn junction_count(&self) -> usize {
        self.junctions.len()
    }

    /// Close open RF port `port` (counted after the junction ports) with
    /// `device` while balancing
    pub fn set_balance_terminator(&mut self, port: usize, device: &impl AsDevice) -> Result<()> {
        let device = device.as_device();
        if device.size() != 1 {
            return Err(Error::DimensionMismatch {
                expected: 1,
                actual: device.size(),
            });
        }
        if self.terminators.len() <= port {
            self.terminators.resize(port + 1, None);
        }
        self.terminators[port] = Some(device);
        self.invalidate();
        Ok(())
    }

    /// Expose only the IF ports; open RF ports stay closed by their balance
    /// terminators during small-signal analysis too
    pub fn set_rf_terminated(&mut self, terminated: bool) {
        if terminated != self.rf_terminated {
            self.rf_terminated = terminated;
            *self.terminated_rf.get_mut() = None;
            self.cache.clear();
        }
    }

    pub fn is_rf_terminated(&self) -> bool {
        self.rf_terminated
    }

    pub fn options(&self) -> &BalanceOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: BalanceOptions) {
        self.options = options;
    }

    /// True once every network and junction is in place
    pub fn is_complete(&self) -> bool {
        self.check_complete().is_ok()
    }

    fn check_complete(&self) -> Result<(&DeviceRef, &DeviceRef, &DeviceRef)> {
        let missing = |what: &str| Error::IncompleteMixer(what.to_string());
        let bias = self.bias.as_ref().ok_or_else(|| missing("no bias circuit"))?;
        let if_circuit = self.if_circuit.as_ref().ok_or_else(|| missing("no IF circuit"))?;
        let rf_circuit = self.rf_circuit.as_ref().ok_or_else(|| missing("no RF circuit"))?;
        let nj = self.junctions.len();
        if nj == 0 {
            return Err(missing("no junctions"));
        }
        if self.harmonics == 0 {
            return Err(missing("harmonic count must be at least 1"));
        }
        if bias.size() != nj {
            return Err(missing(&format!(
                "bias circuit has {} ports for {} junctions",
                bias.size(),
                nj
            )));
        }
        if if_circuit.size() < nj || rf_circuit.size() < nj {
            return Err(missing(&format!(
                "IF and RF circuits need at least {} ports, have {} and {}",
                nj,
                if_circuit.size(),
                rf_circuit.size()
            )));
        }
        let open_rf = rf_circuit.size() - nj;
        if self.terminators.len() > open_rf {
            return Err(missing(&format!(
                "balance terminator on RF port {} of {}",
                self.terminators.len() - 1,
                open_rf
            )));
        }
        Ok((bias, if_circuit, rf_circuit))
    }

    fn lo(&self) -> Result<f64> {
        let lo = self.lo_frequency.get()?;
        if lo <= 0.0 || !lo.is_finite() {
            return Err(Error::InvalidLoFrequency(lo));
        }
        Ok(lo)
    }

    /// RF network with every open port closed by its balance terminator,
    /// exposing only the junction ports
    fn terminated_rf(&self, rf: &DeviceRef) -> Result<Rc<Circuit>> {
        if let Some(c) = self.terminated_rf.borrow().as_ref() {
            return Ok(Rc::clone(c));
        }
        let nj = self.junctions.len();
        let mut circuit = Circuit::new();
        for p in 0..rf.size() - nj {
            let terminator = match self.terminators.get(p) {
                Some(Some(device)) => Rc::clone(device),
                _ => Rc::new(Load::matched()) as DeviceRef,
            };
            circuit.connect(rf, nj + p, &terminator, 0)?;
        }
        for j in 0..nj {
            circuit.add_port(rf, j)?;
        }
        circuit.validate()?;
        log::debug!(
            "mixer {}: terminated {} open RF ports",
            self.id.value(),
            rf.size() - nj
        );
        let circuit = Rc::new(circuit);
        *self.terminated_rf.borrow_mut() = Some(Rc::clone(&circuit));
        Ok(circuit)
    }

    /// Solve the large-signal operating point.
    ///
    /// Non-convergence is reported through [`BalanceReport::converged`]; the
    /// previous operating point, if any, is kept in that case.
    pub fn balance(&self, ctx: &EvalContext, start: BalanceStart) -> Result<BalanceReport> {
        let (bias, _, rf) = self.check_complete()?;
        let lo = self.lo()?;
        let rf = self.terminated_rf(rf)?;
        let nj = self.junctions.len();

        let nets = HarmonicNetworks::evaluate(&**bias, &*rf, nj, self.harmonics, lo, ctx)?;
        let mut balancer = self.balancer.borrow_mut();
        balancer.resize(nj, self.harmonics);
        let report = balancer.balance(&nets, &self.junctions, lo, &self.options, start)?;
        if report.converged {
            self.balanced.set(Some(Snapshot {
                lo_frequency: lo,
                harmonics: self.harmonics,
            }));
            self.cache.clear();
        }
        Ok(report)
    }

    /// True if the last accepted balance matches the current LO and harmonics
    pub fn is_balanced(&self) -> bool {
        match (self.balanced.get(), self.lo_frequency.get()) {
            (Some(snap), Ok(lo)) => snap.lo_frequency == lo && snap.harmonics == self.harmonics,
            _ => false,
        }
    }

    /// Balanced junction voltages, `V_0..=V_H` per junction
    pub fn junction_voltages(&self) -> Vec<Array1<Complex64>> {
        let balancer: Ref<'_, Balancer> = self.balancer.borrow();
        if balancer.has_state() {
            balancer.voltages()
        } else {
            Vec::new()
        }
    }

    /// Port layout of the small-signal device
    pub fn ports(&self) -> HarmonicPorts {
        let nj = self.junctions.len();
        let open = |d: &Option<DeviceRef>| d.as_ref().map_or(0, |d| d.size().saturating_sub(nj));
        let rf_ports = if self.rf_terminated {
            0
        } else {
            open(&self.rf_circuit)
        };
        HarmonicPorts::new(nj, self.harmonics, open(&self.if_circuit), rf_ports)
    }

    /// Mixer port of open linear port `port` at `sideband`
    pub fn port(&self, port: usize, sideband: i32) -> Option<Port> {
        let index = self.ports().port_index(port, sideband);
        if index.is_none() {
            log::warn!(
                "mixer {} has no port {} at sideband {}",
                self.id.value(),
                port,
                sideband
            );
        }
        index.map(|index| Port::new(self.id, index))
    }
}

impl Device for Mixer {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn size(&self) -> usize {
        self.ports().size()
    }

    fn flags(&self) -> DeviceFlags {
        DeviceFlags {
            noise: true,
            active: true,
            source: false,
        }
    }

    fn compute(&self, ctx: &EvalContext, mode: ComputeMode) -> Result<ScatteringData> {
        let (_, if_circuit, rf) = self.check_complete()?;
        let lo = self.lo()?;
        if !self.is_balanced() {
            return Err(Error::NotBalanced);
        }
        let if_freq = ctx.frequency();
        if !(0.0..lo).contains(&if_freq) {
            return Err(Error::InvalidIfFrequency {
                if_freq,
                lo_freq: lo,
            });
        }

        let terminated;
        let rf: &dyn Device = if self.rf_terminated {
            terminated = self.terminated_rf(rf)?;
            &*terminated
        } else {
            &**rf
        };
        analyze::analyze(
            &self.ports(),
            &**if_circuit,
            rf,
            &self.junctions,
            lo,
            ctx,
            mode,
        )
    }

    fn cache(&self) -> &DataCache {
        &self.cache
    }
}
