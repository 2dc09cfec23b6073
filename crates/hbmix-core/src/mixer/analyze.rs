//! Small-signal multi-harmonic analysis
//!
//! With the junctions frozen at their balanced state, every junction becomes
//! a linear (2H+1)-port coupling the sidebands `f_IF + m f_LO`. Seen from the
//! linear networks it reflects the wave it receives through
//! Γ = (I + y)⁻¹(I − y), y = Z0 Y, and adds the noise wave
//! g = −(I + y)⁻¹ √Z0 n.
//!
//! Stacking the sidebands, the linear networks split into external (1) and
//! junction (2) port blocks, and
//!
//! ```text
//! T = (I − Γ S22)⁻¹,  X = S12 T,  Ym = X Γ
//! S = S11 + Ym S21
//! C = C11 + Ym C21 + C12 Ym† + Ym C22 Ym† + X C_g X†
//! ```

use ndarray::{s, Array1, Array2};
use num_complex::Complex64;

use crate::context::EvalContext;
use crate::device::{ComputeMode, Device};
use crate::error::{Error, Result};
use crate::math::linalg::inv_complex;
use crate::math::matrix_ops::{identity, make_hermitian, place_block, sandwich};
use crate::sdata::ScatteringData;

use super::junction::JunctionRef;
use super::ports::HarmonicPorts;

/// Linear network data at sideband frequency `f`, normalized to `z0`.
/// Negative frequencies read the network at `|f|` and conjugate.
fn sideband_data(
    device: &dyn Device,
    frequency: f64,
    ctx: &EvalContext,
    mode: ComputeMode,
) -> Result<ScatteringData> {
    let z0 = ctx.z_normal();
    let data = device.get_data(&ctx.with_frequency(frequency.abs()), mode)?;
    let mut data = if data.z_norm != z0 && data.z_norm != 0.0 {
        data.renormalized(z0)?
    } else {
        (*data).clone()
    };
    if frequency < 0.0 {
        data.s.mapv_inplace(|v| v.conj());
        data.c.mapv_inplace(|v| v.conj());
        data.b.mapv_inplace(|v| v.conj());
    }
    Ok(data)
}

/// Reflection and noise-wave correlation of all junctions in junction space
fn junction_waves(
    layout: &HarmonicPorts,
    junctions: &[JunctionRef],
    ctx: &EvalContext,
    mode: ComputeMode,
) -> Result<(Array2<Complex64>, Array2<Complex64>)> {
    let z0 = ctx.z_normal();
    let n = layout.sidebands();
    let k = layout.junction_size();
    let mut gamma = Array2::<Complex64>::zeros((k, k));
    let mut noise = Array2::<Complex64>::zeros((k, k));

    for (j, junction) in junctions.iter().enumerate() {
        let junction = junction.borrow();
        let y = junction.small_signal(ctx.frequency(), layout.harmonics)? * Complex64::new(z0, 0.0);
        if y.dim() != (n, n) {
            return Err(Error::DimensionMismatch {
                expected: n,
                actual: y.nrows(),
            });
        }
        let inv = inv_complex(&(identity(n) + &y))
            .ok_or(Error::SingularMatrix("junction reflection"))?;
        let offset = j * n;
        place_block(&mut gamma, offset, offset, &inv.dot(&(identity(n) - &y)));

        if mode.wants_noise() {
            let cn = junction.noise(ctx.frequency(), ctx.temperature(), layout.harmonics)?;
            if cn.dim() != (n, n) {
                return Err(Error::DimensionMismatch {
                    expected: n,
                    actual: cn.nrows(),
                });
            }
            place_block(&mut noise, offset, offset, &sandwich(&inv, &(cn * Complex64::new(z0, 0.0))));
        }
    }
    Ok((gamma, noise))
}

/// Converted scattering data of the mixer at IF `ctx.frequency()`.
///
/// `if_circuit` serves sideband 0 and `rf_circuit` every other sideband; the
/// first `layout.junctions` ports of each face the junctions, the rest are
/// the mixer's external ports.
pub(crate) fn analyze(
    layout: &HarmonicPorts,
    if_circuit: &dyn Device,
    rf_circuit: &dyn Device,
    junctions: &[JunctionRef],
    lo_frequency: f64,
    ctx: &EvalContext,
    mode: ComputeMode,
) -> Result<ScatteringData> {
    let nj = layout.junctions;
    let n = layout.size();
    let k = layout.junction_size();
    let noisy = mode.wants_noise();

    let mut s11 = Array2::<Complex64>::zeros((n, n));
    let mut s12 = Array2::<Complex64>::zeros((n, k));
    let mut s21 = Array2::<Complex64>::zeros((k, n));
    let mut s22 = Array2::<Complex64>::zeros((k, k));
    // Linear noise over [external ports, junction ports]
    let mut c_lin = Array2::<Complex64>::zeros((n + k, n + k));

    for m in layout.sideband_range() {
        let f = ctx.frequency() + m as f64 * lo_frequency;
        let device = if m == 0 { if_circuit } else { rf_circuit };
        let data = sideband_data(device, f, ctx, mode)?;
        let ports = layout.ports_at(m);
        if data.size() != nj + ports {
            return Err(Error::DimensionMismatch {
                expected: nj + ports,
                actual: data.size(),
            });
        }

        // Local port -> row in the stacked [external, junction] space
        let mut stacked = Vec::with_capacity(data.size());
        stacked.extend((0..nj).map(|j| n + layout.junction_index(j, m)));
        for p in 0..ports {
            let index = layout.port_index(p, m).ok_or(Error::DimensionMismatch {
                expected: ports,
                actual: p,
            })?;
            stacked.push(index);
        }

        for (q, &row) in stacked.iter().enumerate() {
            for (r, &col) in stacked.iter().enumerate() {
                let v = data.s[[q, r]];
                match (row >= n, col >= n) {
                    (false, false) => s11[[row, col]] = v,
                    (false, true) => s12[[row, col - n]] = v,
                    (true, false) => s21[[row - n, col]] = v,
                    (true, true) => s22[[row - n, col - n]] = v,
                }
                if noisy {
                    c_lin[[row, col]] = data.c[[q, r]];
                }
            }
        }
    }

    let (gamma, c_g) = junction_waves(layout, junctions, ctx, mode)?;

    let t = inv_complex(&(identity(k) - gamma.dot(&s22)))
        .ok_or(Error::SingularMatrix("small-signal conversion"))?;
    let x = s12.dot(&t);
    let ym = x.dot(&gamma);

    let mut result = ScatteringData::new(n);
    result.s = &s11 + &ym.dot(&s21);
    result.z_norm = ctx.z_normal();

    if noisy {
        // Output noise waves: [I, Ym] applied to the linear noise, X to g
        let mut w = Array2::<Complex64>::zeros((n, n + k));
        w.slice_mut(s![.., ..n]).assign(&identity(n));
        w.slice_mut(s![.., n..]).assign(&ym);
        let mut c = sandwich(&w, &c_lin) + sandwich(&x, &c_g);
        make_hermitian(&mut c);
        result.c = c;
    }
    result.b = Array1::zeros(n);

    log::debug!(
        "small-signal analysis at {:.6e} Hz: {} ports, {} junction sidebands",
        ctx.frequency(),
        n,
        k
    );
    Ok(result)
}
