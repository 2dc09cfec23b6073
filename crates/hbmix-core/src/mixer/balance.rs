//! Harmonic-balance solver
//!
//! Finds the junction harmonic voltages at which the currents the junctions
//! draw are consistent with the linear bias and RF networks at every LO
//! harmonic. At each junction port the linear network sees the incident wave
//! a = (V - Z0 I) / (2 sqrt(Z0)) and emits b = (V + Z0 I) / (2 sqrt(Z0)),
//! so balance means, per harmonic h,
//!
//! f(V) = V + Z0 I(V) - S_h (V - Z0 I(V)) - 2 sqrt(Z0) B_h = 0
//!
//! The unknowns are packed as real/imaginary pairs, junction major. DC
//! voltages are real: their imaginary slot carries a unit Jacobian row.

use std::rc::Rc;

use ndarray::{s, Array1, Array2};
use num_complex::Complex64;

use crate::context::EvalContext;
use crate::device::{ComputeMode, Device};
use crate::error::{Error, Result};
use crate::math::linalg::{solve_complex, solve_real};
use crate::math::matrix_ops::identity;

use super::junction::JunctionRef;
use super::ports::HarmonicPorts;

/// Convergence criteria for the harmonic-balance Newton iteration.
#[derive(Debug, Clone)]
pub struct BalanceOptions {
    /// Maximum Newton iterations per attempt
    pub max_iterations: usize,
    /// Largest residual component accepted (V)
    pub max_residual: f64,
    /// Largest residual sum of squares accepted (V^2)
    pub max_sum_squares: f64,
    /// Accept when the step is this small relative to the largest unknown
    pub relative_step: f64,
    /// Largest change of any voltage component in one step (V)
    pub max_step: f64,
    /// Fraction of the (clipped) Newton step taken
    pub damping: f64,
    /// An iteration whose sum of squares exceeds this fraction of the
    /// previous one counts as stalled
    pub stall_ratio: f64,
    /// Consecutive stalled iterations before giving up
    pub stall_limit: usize,
}

impl Default for BalanceOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_residual: 1e-9,
            max_sum_squares: 1e-18,
            relative_step: 1e-9,
            max_step: 0.1,
            damping: 1.0,
            stall_ratio: 0.999,
            stall_limit: 5,
        }
    }
}

/// Starting point of a balance attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceStart {
    /// Continue from the last balanced state, if any
    Previous,
    /// Start from the open-circuit voltages of the linear networks
    OpenCircuit,
}

/// Outcome of a balance attempt
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceReport {
    pub converged: bool,
    /// Newton iterations of the final attempt
    pub iterations: usize,
    /// Largest residual component at exit (V)
    pub residual: f64,
    /// True if the open-circuit restart was needed
    pub restarted: bool,
}

/// Linear networks at the LO harmonics, restricted to the junction ports
pub(crate) struct HarmonicNetworks {
    /// S-matrix blocks, J x J, for h = 0..=H
    pub s: Vec<Array2<Complex64>>,
    /// Equivalent source voltages 2 sqrt(Z0) B, for h = 0..=H
    pub source: Vec<Array1<Complex64>>,
    pub z0: f64,
}

impl HarmonicNetworks {
    /// Evaluate `bias` at DC and `rf` at each LO harmonic. Ports beyond the
    /// first `junctions` are left matched.
    pub fn evaluate(
        bias: &dyn Device,
        rf: &dyn Device,
        junctions: usize,
        harmonics: usize,
        lo_frequency: f64,
        ctx: &EvalContext,
    ) -> Result<Self> {
        let z0 = ctx.z_normal();
        let scale = 2.0 * z0.sqrt();
        let mut s_blocks = Vec::with_capacity(harmonics + 1);
        let mut sources = Vec::with_capacity(harmonics + 1);

        for h in 0..=harmonics {
            let (device, f) = if h == 0 {
                (bias, 0.0)
            } else {
                (rf, h as f64 * lo_frequency)
            };
            let data = device.get_data(&ctx.with_frequency(f), ComputeMode::ScatteringOnly)?;
            let data = if data.z_norm != z0 && data.z_norm != 0.0 {
                Rc::new(data.renormalized(z0)?)
            } else {
                data
            };
            if data.size() < junctions {
                return Err(Error::DimensionMismatch {
                    expected: junctions,
                    actual: data.size(),
                });
            }
            s_blocks.push(data.s.slice(s![..junctions, ..junctions]).to_owned());
            sources.push(data.b.slice(s![..junctions]).mapv(|b| b * scale));
        }

        Ok(Self {
            s: s_blocks,
            source: sources,
            z0,
        })
    }
}

fn measure(f: &Array1<f64>) -> (f64, f64) {
    f.iter()
        .fold((0.0_f64, 0.0_f64), |(m, ss), v| (m.max(v.abs()), ss + v * v))
}

/// Newton-Raphson state of the harmonic balance
#[derive(Debug)]
pub(crate) struct Balancer {
    layout: HarmonicPorts,
    /// Voltage representation, 2 J (H+1) reals
    x: Array1<f64>,
    has_state: bool,
    /// LO frequency of the current state
    lo_frequency: f64,
}

impl Balancer {
    pub fn new() -> Self {
        Self {
            layout: HarmonicPorts::new(0, 0, 0, 0),
            x: Array1::zeros(0),
            has_state: false,
            lo_frequency: 0.0,
        }
    }

    /// Size the buffers for `junctions` and `harmonics`, dropping the state
    /// if the shape changes
    pub fn resize(&mut self, junctions: usize, harmonics: usize) {
        if self.layout.junctions != junctions || self.layout.harmonics != harmonics {
            self.layout = HarmonicPorts::new(junctions, harmonics, 0, 0);
            self.x = Array1::zeros(2 * self.layout.balance_size());
            self.has_state = false;
        }
    }

    /// Forget the current state
    pub fn invalidate(&mut self) {
        self.has_state = false;
    }

    pub fn has_state(&self) -> bool {
        self.has_state
    }

    /// Junction voltages, V_0 ..= V_H per junction
    pub fn voltages(&self) -> Vec<Array1<Complex64>> {
        self.unpack(&self.x)
    }

    fn unpack(&self, x: &Array1<f64>) -> Vec<Array1<Complex64>> {
        let layout = &self.layout;
        (0..layout.junctions)
            .map(|j| {
                Array1::from_shape_fn(layout.harmonics + 1, |h| {
                    let idx = 2 * layout.balance_index(j, h);
                    let im = if h == 0 { 0.0 } else { x[idx + 1] };
                    Complex64::new(x[idx], im)
                })
            })
            .collect()
    }

    /// Voltages the linear networks develop across open junction ports
    fn open_circuit_estimate(&mut self, nets: &HarmonicNetworks) {
        let layout = self.layout;
        for h in 0..=layout.harmonics {
            let a = identity(layout.junctions) - &nets.s[h];
            let v = solve_complex(&a, &nets.source[h]).unwrap_or_else(|| {
                log::warn!("open-circuit estimate singular at harmonic {}", h);
                nets.source[h].clone()
            });
            for j in 0..layout.junctions {
                let idx = 2 * layout.balance_index(j, h);
                self.x[idx] = v[j].re;
                self.x[idx + 1] = if h == 0 { 0.0 } else { v[j].im };
            }
        }
    }

    /// Residual at `x`; leaves every junction in the state for `x`
    fn residual(
        &self,
        x: &Array1<f64>,
        nets: &HarmonicNetworks,
        junctions: &[JunctionRef],
        lo_frequency: f64,
    ) -> Result<Array1<f64>> {
        let layout = &self.layout;
        let nh = layout.harmonics;
        let v = self.unpack(x);

        let mut currents = Vec::with_capacity(junctions.len());
        for (j, junction) in junctions.iter().enumerate() {
            let i = junction.borrow_mut().large_signal(&v[j], lo_frequency, nh)?;
            if i.len() != nh + 1 {
                return Err(Error::DimensionMismatch {
                    expected: nh + 1,
                    actual: i.len(),
                });
            }
            currents.push(i);
        }

        let z0 = nets.z0;
        let mut f = Array1::<f64>::zeros(x.len());
        for h in 0..=nh {
            let s = &nets.s[h];
            for j in 0..layout.junctions {
                let mut acc = v[j][h] + currents[j][h] * z0 - nets.source[h][j];
                for jp in 0..layout.junctions {
                    acc -= s[[j, jp]] * (v[jp][h] - currents[jp][h] * z0);
                }
                let idx = 2 * layout.balance_index(j, h);
                f[idx] = acc.re;
                f[idx + 1] = if h == 0 { x[idx + 1] } else { acc.im };
            }
        }
        Ok(f)
    }

    /// Jacobian of the residual at the junctions' current state
    fn jacobian(&self, nets: &HarmonicNetworks, junctions: &[JunctionRef]) -> Result<Array2<f64>> {
        let layout = &self.layout;
        let nh = layout.harmonics;
        let nj = layout.junctions;
        let z0 = nets.z0;
        let mut admittances = Vec::with_capacity(nj);
        for junction in junctions {
            let y = junction.borrow().small_signal(0.0, nh)?;
            if y.dim() != (layout.sidebands(), layout.sidebands()) {
                return Err(Error::DimensionMismatch {
                    expected: layout.sidebands(),
                    actual: y.nrows(),
                });
            }
            admittances.push(y);
        }

        let n = 2 * layout.balance_size();
        let mut jac = Array2::<f64>::zeros((n, n));
        for h in 0..=nh {
            let s = &nets.s[h];
            let row_h = layout.offset(h as i32);
            for j in 0..nj {
                let r = 2 * layout.balance_index(j, h);
                for jp in 0..nj {
                    let delta = if j == jp { 1.0 } else { 0.0 };
                    // dI enters as (I + S) dI, dV as (I - S) dV
                    let m = (s[[j, jp]] + delta) * z0;
                    let y = &admittances[jp];
                    for hp in 0..=nh {
                        let c = 2 * layout.balance_index(jp, hp);
                        let mut a = m * y[[row_h, layout.offset(hp as i32)]];
                        if hp == h {
                            a += -s[[j, jp]] + delta;
                        }
                        if hp == 0 {
                            // Only Re V_0 is an unknown of the physical system
                            jac[[r, c]] = a.re;
                            jac[[r + 1, c]] = a.im;
                        } else {
                            let b = m * y[[row_h, layout.offset(-(hp as i32))]];
                            jac[[r, c]] = (a + b).re;
                            jac[[r, c + 1]] = -(a - b).im;
                            jac[[r + 1, c]] = (a + b).im;
                            jac[[r + 1, c + 1]] = (a - b).re;
                        }
                    }
                }
                if h == 0 {
                    jac.row_mut(r + 1).fill(0.0);
                    jac[[r + 1, r + 1]] = 1.0;
                }
            }
        }
        Ok(jac)
    }

    fn newton(
        &mut self,
        nets: &HarmonicNetworks,
        junctions: &[JunctionRef],
        lo_frequency: f64,
        options: &BalanceOptions,
    ) -> Result<BalanceReport> {
        let mut f = self.residual(&self.x, nets, junctions, lo_frequency)?;
        let (mut max_abs, mut sum_sq) = measure(&f);
        let mut iterations = 0;
        let mut stalls = 0;

        let report = |converged: bool, iterations: usize, residual: f64| BalanceReport {
            converged,
            iterations,
            residual,
            restarted: false,
        };

        loop {
            if max_abs <= options.max_residual && sum_sq <= options.max_sum_squares {
                return Ok(report(true, iterations, max_abs));
            }
            if iterations >= options.max_iterations {
                return Ok(report(false, iterations, max_abs));
            }
            iterations += 1;

            let jac = self.jacobian(nets, junctions)?;
            let rhs = f.mapv(|v| -v);
            let dx = match solve_real(&jac, &rhs) {
                Some(dx) => dx,
                None => {
                    log::warn!("singular harmonic-balance Jacobian at iteration {}", iterations);
                    return Ok(report(false, iterations, max_abs));
                }
            };

            let step = dx.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
            let clip = if step > options.max_step {
                options.max_step / step
            } else {
                1.0
            };
            let scale = options.damping * clip;
            self.x.scaled_add(scale, &dx);

            f = self.residual(&self.x, nets, junctions, lo_frequency)?;
            let (new_max, new_sum_sq) = measure(&f);
            log::debug!(
                "balance iteration {}: max residual {:.3e}, sum squares {:.3e}, step {:.3e}",
                iterations,
                new_max,
                new_sum_sq,
                scale * step
            );
            if !new_sum_sq.is_finite() {
                return Ok(report(false, iterations, new_max));
            }

            let size = self.x.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
            if clip == 1.0 && scale * step <= options.relative_step * size {
                return Ok(report(true, iterations, new_max));
            }

            if new_sum_sq > options.stall_ratio * sum_sq {
                stalls += 1;
                if stalls >= options.stall_limit {
                    log::debug!("balance stalled after {} iterations", iterations);
                    return Ok(report(false, iterations, new_max));
                }
            } else {
                stalls = 0;
            }
            max_abs = new_max;
            sum_sq = new_sum_sq;
        }
    }

    /// Run one balance attempt, retrying once from the open-circuit estimate.
    /// On failure the previous state, including the junctions', is restored.
    pub fn balance(
        &mut self,
        nets: &HarmonicNetworks,
        junctions: &[JunctionRef],
        lo_frequency: f64,
        options: &BalanceOptions,
        start: BalanceStart,
    ) -> Result<BalanceReport> {
        let saved_x = self.x.clone();
        let saved_has_state = self.has_state;
        let saved_lo = self.lo_frequency;
        let saved_junctions: Vec<Option<Array1<Complex64>>> = junctions
            .iter()
            .map(|j| {
                let j = j.borrow();
                j.is_state_valid().then(|| j.operating_voltage())
            })
            .collect();

        let from_estimate = start == BalanceStart::OpenCircuit || !self.has_state;
        if from_estimate {
            self.open_circuit_estimate(nets);
        }
        let mut report = self.newton(nets, junctions, lo_frequency, options)?;

        if !report.converged && !from_estimate {
            log::warn!(
                "harmonic balance failed after {} iterations, restarting from open-circuit voltages",
                report.iterations
            );
            self.open_circuit_estimate(nets);
            report = self.newton(nets, junctions, lo_frequency, options)?;
            report.restarted = true;
        }

        if report.converged {
            self.has_state = true;
            self.lo_frequency = lo_frequency;
            log::info!(
                "harmonic balance converged in {} iterations (residual {:.3e} V)",
                report.iterations,
                report.residual
            );
        } else {
            log::warn!(
                "harmonic balance did not converge (residual {:.3e} V); previous state restored",
                report.residual
            );
            self.x = saved_x;
            self.has_state = saved_has_state;
            self.lo_frequency = saved_lo;
            for (junction, saved) in junctions.iter().zip(saved_junctions) {
                if let Some(v) = saved {
                    junction
                        .borrow_mut()
                        .large_signal(&v, saved_lo, self.layout.harmonics)?;
                }
            }
        }
        Ok(report)
    }
}
