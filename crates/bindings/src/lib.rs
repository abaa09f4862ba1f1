#![allow(clippy::useless_conversion)]
#![allow(clippy::too_many_arguments)]

use ndarray::{Array1, Array2, Array3};
use numpy::{
    PyArrayDescrMethods, PyReadonlyArray2, PyReadonlyArray3, PyUntypedArray,
    PyUntypedArrayMethods, ToPyArray,
};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use rtk_core::neighbors::{find_pairs, NeighborStrategy};
use rtk_core::rdf::{radial_distribution, trajectory_rdf, RdfParams};
use rtk_core::wrapping::{unwrap_trajectory, unwrap_trajectory_fixed_box};
use rtk_core::{KernelError, PeriodicBox, Trajectory};
use rtk_transport::{
    compute_moments_fft, compute_particle_moments, direct_moment_series, einstein_diffusion,
    DiffusionFit, EnsembleMoments, MomentMethod, TransportConfig,
};

// ============================================================================
// Helpers: errors, dtype handling, parameter parsing
// ============================================================================

fn to_py_err(err: KernelError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn is_f32(py: Python<'_>, array: &Bound<'_, PyUntypedArray>) -> bool {
    array.dtype().is_equiv_to(&numpy::dtype_bound::<f32>(py))
}

/// Read a `[frames, particles, 3]` array of either precision.
fn read_trajectory(py: Python<'_>, array: &Bound<'_, PyUntypedArray>) -> PyResult<Trajectory> {
    if array.ndim() != 3 {
        return Err(PyValueError::new_err(format!(
            "trajectory must have shape (n_frames, n_particles, 3), got {} dimensions",
            array.ndim()
        )));
    }
    if is_f32(py, array) {
        let arr: PyReadonlyArray3<'_, f32> = array.extract()?;
        Trajectory::from_array_f32(arr.as_array()).map_err(to_py_err)
    } else {
        let arr: PyReadonlyArray3<'_, f64> = array.extract()?;
        Trajectory::from_array(arr.as_array()).map_err(to_py_err)
    }
}

/// Read an `[n, 3]` array of either precision as points.
fn read_points(py: Python<'_>, array: &Bound<'_, PyUntypedArray>) -> PyResult<Vec<[f64; 3]>> {
    let shape = array.shape();
    if shape.len() != 2 || shape[1] != 3 {
        return Err(PyValueError::new_err(format!(
            "positions must have shape (n, 3), got {:?}",
            shape
        )));
    }
    let arr: PyReadonlyArray2<'_, f64> = if is_f32(py, array) {
        array
            .call_method1("astype", (numpy::dtype_bound::<f64>(py),))?
            .extract()?
    } else {
        array.extract()?
    };
    Ok(arr
        .as_array()
        .outer_iter()
        .map(|row| [row[0], row[1], row[2]])
        .collect())
}

/// Read a single-particle `[n_frames, 3]` array of either precision.
fn read_series(py: Python<'_>, array: &Bound<'_, PyUntypedArray>) -> PyResult<Vec<[f64; 3]>> {
    if array.ndim() != 2 {
        return Err(PyValueError::new_err(format!(
            "series must have shape (n_frames, 3), got {} dimensions",
            array.ndim()
        )));
    }
    let arr: PyReadonlyArray2<'_, f64> = if is_f32(py, array) {
        array
            .call_method1("astype", (numpy::dtype_bound::<f64>(py),))?
            .extract()?
    } else {
        array.extract()?
    };
    let traj = Trajectory::from_series_array(arr.as_array()).map_err(to_py_err)?;
    Ok(traj.particle_series(0))
}

/// A box given as an edge length, three edge lengths, or a 3x3 matrix whose
/// rows are the box vectors.
fn read_box(spec: &Bound<'_, PyAny>) -> PyResult<PeriodicBox> {
    if let Ok(edge) = spec.extract::<f64>() {
        return PeriodicBox::cubic(edge).map_err(to_py_err);
    }
    if let Ok(lengths) = spec.extract::<Vec<f64>>() {
        return match lengths.as_slice() {
            &[lx, ly, lz] => PeriodicBox::orthorhombic([lx, ly, lz]).map_err(to_py_err),
            _ => Err(PyValueError::new_err(format!(
                "box edge lengths must have 3 entries, got {}",
                lengths.len()
            ))),
        };
    }
    let rows: Vec<Vec<f64>> = spec.extract()?;
    if rows.len() != 3 || rows.iter().any(|r| r.len() != 3) {
        return Err(PyValueError::new_err("box matrix must be 3x3"));
    }
    PeriodicBox::triclinic([
        [rows[0][0], rows[0][1], rows[0][2]],
        [rows[1][0], rows[1][1], rows[1][2]],
        [rows[2][0], rows[2][1], rows[2][2]],
    ])
    .map_err(to_py_err)
}

fn parse_method(method: &str) -> PyResult<MomentMethod> {
    match method.to_ascii_lowercase().as_str() {
        "direct" => Ok(MomentMethod::Direct),
        "fft" => Ok(MomentMethod::Fft),
        "auto" => Ok(MomentMethod::Auto),
        other => Err(PyValueError::new_err(format!(
            "Unknown method '{}'. Use 'direct', 'fft', or 'auto'",
            other
        ))),
    }
}

fn parse_strategy(strategy: &str) -> PyResult<NeighborStrategy> {
    match strategy.to_ascii_lowercase().as_str() {
        "brute_force" | "brute" => Ok(NeighborStrategy::BruteForce),
        "cell_list" | "cells" => Ok(NeighborStrategy::CellList),
        "kdtree" | "kd_tree" => Ok(NeighborStrategy::KdTree),
        other => Err(PyValueError::new_err(format!(
            "Unknown strategy '{}'. Use 'brute_force', 'cell_list', or 'kdtree'",
            other
        ))),
    }
}

/// Return `array` in the caller's precision.
fn restore_precision<'py>(
    py: Python<'py>,
    array: Array3<f64>,
    as_f32: bool,
) -> PyResult<PyObject> {
    let result_f64 = array.to_pyarray_bound(py);
    if as_f32 {
        let result_f32 = result_f64.call_method1("astype", (numpy::dtype_bound::<f32>(py),))?;
        Ok(result_f32.into())
    } else {
        Ok(result_f64.into())
    }
}

// ============================================================================
// Displacement moments
// ============================================================================

/// Per-particle MSD, fourth moment and NGP for every lag.
///
/// Returns a dict of `(n_lags, n_particles)` arrays; row `k` is lag `k + 1`.
#[pyfunction]
#[pyo3(signature = (trajectory, method="auto", fft_threshold=64, max_lag=None, compute_fourth_moment=true, timestep=1.0))]
fn compute_msd<'py>(
    py: Python<'py>,
    trajectory: &Bound<'py, PyUntypedArray>,
    method: &str,
    fft_threshold: usize,
    max_lag: Option<usize>,
    compute_fourth_moment: bool,
    timestep: f64,
) -> PyResult<Bound<'py, PyDict>> {
    let traj = read_trajectory(py, trajectory)?;
    let config = TransportConfig {
        method: parse_method(method)?,
        fft_threshold,
        max_lag,
        compute_fourth_moment,
        timestep,
    };

    let moments = py
        .allow_threads(|| compute_particle_moments(&traj, &config))
        .map_err(to_py_err)?;

    let dict = PyDict::new_bound(py);
    dict.set_item("msd", moments.msd.to_pyarray_bound(py))?;
    if let Some(ngp) = moments.ngp() {
        dict.set_item("ngp", ngp.to_pyarray_bound(py))?;
    }
    if let Some(fourth) = &moments.fourth_moment {
        dict.set_item("fourth_moment", fourth.to_pyarray_bound(py))?;
    }
    let time: Vec<f64> = (1..=moments.n_lags())
        .map(|lag| lag as f64 * timestep)
        .collect();
    dict.set_item("time", time.to_pyarray_bound(py))?;
    dict.set_item("method", format!("{:?}", moments.method).to_lowercase())?;
    Ok(dict)
}

fn ensemble_to_dict<'py>(py: Python<'py>, ensemble: &EnsembleMoments) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("time", ensemble.time.to_pyarray_bound(py))?;
    dict.set_item("msd", ensemble.msd.to_pyarray_bound(py))?;
    if let Some(fourth) = &ensemble.fourth_moment {
        dict.set_item("fourth_moment", fourth.to_pyarray_bound(py))?;
    }
    if let Some(ngp) = &ensemble.ngp {
        dict.set_item("ngp", ngp.to_pyarray_bound(py))?;
    }
    Ok(dict)
}

/// Particle-averaged moments with the Einstein diffusion coefficient.
#[pyfunction]
#[pyo3(signature = (trajectory, method="auto", max_lag=None, timestep=1.0, fit_start=0.1, fit_end=0.5))]
fn compute_ensemble_msd<'py>(
    py: Python<'py>,
    trajectory: &Bound<'py, PyUntypedArray>,
    method: &str,
    max_lag: Option<usize>,
    timestep: f64,
    fit_start: f64,
    fit_end: f64,
) -> PyResult<Bound<'py, PyDict>> {
    let traj = read_trajectory(py, trajectory)?;
    let config = TransportConfig {
        method: parse_method(method)?,
        max_lag,
        timestep,
        ..TransportConfig::default()
    };
    let fit = DiffusionFit {
        start_fraction: fit_start,
        end_fraction: fit_end,
    };

    let (ensemble, diffusion) = py
        .allow_threads(|| -> Result<_, KernelError> {
            let ensemble = compute_particle_moments(&traj, &config)?.ensemble();
            let diffusion = einstein_diffusion(&ensemble, &fit)?;
            Ok((ensemble, diffusion))
        })
        .map_err(to_py_err)?;

    let dict = ensemble_to_dict(py, &ensemble)?;
    dict.set_item("diffusion_coefficient", diffusion)?;
    Ok(dict)
}

/// All-lag moments of a single particle series of shape `(n_frames, 3)`.
///
/// Entry 0 of every array is the zero lag.
#[pyfunction]
#[pyo3(signature = (series, method="fft"))]
fn msd_series<'py>(
    py: Python<'py>,
    series: &Bound<'py, PyUntypedArray>,
    method: &str,
) -> PyResult<Bound<'py, PyDict>> {
    let points = read_series(py, series)?;
    let result = match parse_method(method)? {
        MomentMethod::Direct => direct_moment_series(&points),
        MomentMethod::Fft | MomentMethod::Auto => compute_moments_fft(&points),
    }
    .map_err(to_py_err)?;

    let dict = PyDict::new_bound(py);
    dict.set_item("msd", result.msd.to_pyarray_bound(py))?;
    dict.set_item("fourth_moment", result.fourth_moment.to_pyarray_bound(py))?;
    dict.set_item("ngp", result.ngp().to_pyarray_bound(py))?;
    if let Some(axial) = &result.axial_fourth_moment {
        dict.set_item("axial_fourth_moment", axial.to_pyarray_bound(py))?;
    }
    Ok(dict)
}

// ============================================================================
// Neighbor pairs and RDF
// ============================================================================

/// All pairs within `cutoff` under periodic boundaries.
///
/// Returns `(pairs, distances)` with `pairs` of shape `(n_pairs, 2)`, sorted
/// by `(i, j)` and `i < j`.
#[pyfunction]
#[pyo3(name = "find_pairs", signature = (positions, box_dimensions, cutoff, strategy="cell_list"))]
fn find_pairs_py<'py>(
    py: Python<'py>,
    positions: &Bound<'py, PyUntypedArray>,
    box_dimensions: &Bound<'py, PyAny>,
    cutoff: f64,
    strategy: &str,
) -> PyResult<(PyObject, PyObject)> {
    let points = read_points(py, positions)?;
    let pbc = read_box(box_dimensions)?;
    let strategy = parse_strategy(strategy)?;

    let pairs = py
        .allow_threads(|| find_pairs(&points, &pbc, cutoff, strategy))
        .map_err(to_py_err)?;

    let index = Array2::from_shape_fn((pairs.len(), 2), |(k, col)| {
        if col == 0 {
            pairs[k].i as i64
        } else {
            pairs[k].j as i64
        }
    });
    let distances: Array1<f64> = pairs.iter().map(|p| p.distance).collect();
    Ok((
        index.to_pyarray_bound(py).into(),
        distances.to_pyarray_bound(py).into(),
    ))
}

/// Radial distribution function of one configuration `(n, 3)` or averaged
/// over a trajectory `(n_frames, n, 3)`.
///
/// Returns `(r, g)`.
#[pyfunction]
#[pyo3(name = "radial_distribution", signature = (positions, box_dimensions, r_max=None, n_bins=100, strategy="cell_list"))]
fn radial_distribution_py<'py>(
    py: Python<'py>,
    positions: &Bound<'py, PyUntypedArray>,
    box_dimensions: &Bound<'py, PyAny>,
    r_max: Option<f64>,
    n_bins: usize,
    strategy: &str,
) -> PyResult<(PyObject, PyObject)> {
    let pbc = read_box(box_dimensions)?;
    let strategy = parse_strategy(strategy)?;
    let params = RdfParams { r_max, n_bins };

    let rdf = if positions.ndim() == 3 {
        let traj = read_trajectory(py, positions)?;
        py.allow_threads(|| trajectory_rdf(&traj, &pbc, &params, strategy))
    } else {
        let points = read_points(py, positions)?;
        py.allow_threads(|| -> Result<_, KernelError> {
            let cutoff = params.resolve_r_max(&pbc)?;
            let pairs = find_pairs(&points, &pbc, cutoff, strategy)?;
            radial_distribution(&pairs, points.len(), &pbc, &params)
        })
    }
    .map_err(to_py_err)?;

    Ok((
        rdf.r_values.to_pyarray_bound(py).into(),
        rdf.g_values.to_pyarray_bound(py).into(),
    ))
}

// ============================================================================
// Unwrapping
// ============================================================================

/// Remove periodic jumps from a trajectory simulated in one fixed box.
///
/// Output precision matches the input.
#[pyfunction]
#[pyo3(name = "unwrap_trajectory", signature = (trajectory, box_dimensions))]
fn unwrap_trajectory_py<'py>(
    py: Python<'py>,
    trajectory: &Bound<'py, PyUntypedArray>,
    box_dimensions: &Bound<'py, PyAny>,
) -> PyResult<PyObject> {
    let as_f32 = is_f32(py, trajectory);
    let traj = read_trajectory(py, trajectory)?;
    let pbc = read_box(box_dimensions)?;
    let unwrapped = py.allow_threads(|| unwrap_trajectory_fixed_box(&traj, &pbc));
    restore_precision(py, unwrapped.to_array(), as_f32)
}

/// Remove periodic jumps using one box per frame: `(n_frames, 3)` edge
/// lengths or `(n_frames, 3, 3)` box matrices.
#[pyfunction]
#[pyo3(signature = (trajectory, box_dimensions))]
fn unwrap_trajectory_per_frame<'py>(
    py: Python<'py>,
    trajectory: &Bound<'py, PyUntypedArray>,
    box_dimensions: &Bound<'py, PyAny>,
) -> PyResult<PyObject> {
    let as_f32 = is_f32(py, trajectory);
    let traj = read_trajectory(py, trajectory)?;

    let boxes: Vec<PeriodicBox> = if let Ok(lengths) = box_dimensions.extract::<Vec<[f64; 3]>>() {
        lengths
            .into_iter()
            .map(PeriodicBox::orthorhombic)
            .collect::<Result<_, _>>()
            .map_err(to_py_err)?
    } else {
        let matrices: Vec<[[f64; 3]; 3]> = box_dimensions.extract()?;
        matrices
            .into_iter()
            .map(PeriodicBox::triclinic)
            .collect::<Result<_, _>>()
            .map_err(to_py_err)?
    };

    let unwrapped = py
        .allow_threads(|| unwrap_trajectory(&traj, &boxes))
        .map_err(to_py_err)?;
    restore_precision(py, unwrapped.to_array(), as_f32)
}

// ============================================================================
// Module
// ============================================================================

#[pymodule]
fn rust_trajectory_kernels(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Displacement moments
    m.add_function(wrap_pyfunction!(compute_msd, m)?)?;
    m.add_function(wrap_pyfunction!(compute_ensemble_msd, m)?)?;
    m.add_function(wrap_pyfunction!(msd_series, m)?)?;

    // Neighbors
    m.add_function(wrap_pyfunction!(find_pairs_py, m)?)?;
    m.add_function(wrap_pyfunction!(radial_distribution_py, m)?)?;

    // Unwrapping
    m.add_function(wrap_pyfunction!(unwrap_trajectory_py, m)?)?;
    m.add_function(wrap_pyfunction!(unwrap_trajectory_per_frame, m)?)?;

    Ok(())
}
