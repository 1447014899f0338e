//! Flat C-callable boundary for the kspace PME engine.
//!
//! One entry-point family per precision (`kspace_*_d` for f64,
//! `kspace_*_f` for f32), marshaling plain row-major arrays into the core's
//! matrix views. Errors — including panics — are caught here, a diagnostic
//! is written to standard error, and the process exits with a nonzero code;
//! the library layer underneath is fully `Result`-based, so callers who need
//! recoverable errors can link against `kspace-core` directly.

use kspace_core::core::lattice::LatticeType;
use kspace_core::core::matrix::{Matrix, MatrixView, MatrixViewMut};
use kspace_core::core::multipole::n_cartesian;
use kspace_core::core::scalar::Real;
use kspace_core::engine::config::PmeOptions;
use kspace_core::engine::grid::GridDims;
use kspace_core::engine::pme::Pme;
use std::fmt::Display;
use std::os::raw::{c_int, c_short};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process;
use std::slice;

fn fail(context: &str, message: impl Display) -> ! {
    eprintln!("{context}: {message}");
    process::exit(1);
}

fn guarded<T>(context: &'static str, run: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(run)) {
        Ok(value) => value,
        Err(_) => fail(context, "an unknown error occurred"),
    }
}

fn checked_count(context: &'static str, name: &str, value: c_int) -> usize {
    if value < 0 {
        fail(context, format_args!("{name} must be non-negative, got {value}"));
    }
    value as usize
}

fn lattice_type(context: &'static str, code: c_int) -> LatticeType {
    match code {
        0 => LatticeType::XAligned,
        1 => LatticeType::ShapeMatrix,
        other => fail(context, format_args!("unknown lattice type {other}")),
    }
}

fn view_or_die<'a, R: Real>(
    context: &'static str,
    rows: usize,
    cols: usize,
    data: &'a [R],
) -> MatrixView<'a, R> {
    match MatrixView::new(rows, cols, data) {
        Ok(view) => view,
        Err(e) => fail(context, e),
    }
}

macro_rules! flat_boundary {
    (
        $real:ty, $handle:ident, $create:ident, $setup:ident, $set_lattice:ident,
        $e_rec:ident, $ef_rec:ident, $efv_rec:ident, $p_rec:ident, $destroy:ident
    ) => {
        /// Opaque instance handle; created empty and populated by setup.
        pub struct $handle {
            inner: Option<Pme<$real>>,
        }

        impl $handle {
            fn engine(&mut self, context: &'static str) -> &mut Pme<$real> {
                match self.inner.as_mut() {
                    Some(engine) => engine,
                    None => fail(context, "instance has not been set up"),
                }
            }
        }

        #[no_mangle]
        pub extern "C" fn $create() -> *mut $handle {
            guarded(stringify!($create), || {
                Box::into_raw(Box::new($handle { inner: None }))
            })
        }

        /// # Safety
        ///
        /// `pme` must be a live pointer obtained from the matching create
        /// call and not yet destroyed.
        #[no_mangle]
        pub unsafe extern "C" fn $setup(
            pme: *mut $handle,
            r_power: c_short,
            kappa: $real,
            spline_order: c_int,
            a_dim: c_int,
            b_dim: c_int,
            c_dim: c_int,
            scale_factor: $real,
            n_threads: c_int,
        ) {
            let context = stringify!($setup);
            let handle = unsafe { handle_mut(pme, context) };
            guarded(context, || {
                if r_power <= 0 {
                    fail(context, format_args!("rPower must be positive, got {r_power}"));
                }
                let options = PmeOptions {
                    r_power: r_power as u16,
                    kappa: f64::from(kappa),
                    spline_order: checked_count(context, "splineOrder", spline_order),
                    grid: GridDims::new(
                        checked_count(context, "aDim", a_dim),
                        checked_count(context, "bDim", b_dim),
                        checked_count(context, "cDim", c_dim),
                    ),
                    scale_factor: f64::from(scale_factor),
                    threads: checked_count(context, "nThreads", n_threads),
                };
                match Pme::new(options) {
                    Ok(engine) => handle.inner = Some(engine),
                    Err(e) => fail(context, e),
                }
            })
        }

        /// # Safety
        ///
        /// `pme` must be a live, set-up instance pointer.
        #[no_mangle]
        pub unsafe extern "C" fn $set_lattice(
            pme: *mut $handle,
            a: $real,
            b: $real,
            c: $real,
            alpha: $real,
            beta: $real,
            gamma: $real,
            lattice_type_code: c_int,
        ) {
            let context = stringify!($set_lattice);
            let handle = unsafe { handle_mut(pme, context) };
            guarded(context, || {
                let kind = lattice_type(context, lattice_type_code);
                if let Err(e) = handle
                    .engine(context)
                    .set_lattice_vectors(a, b, c, alpha, beta, gamma, kind)
                {
                    fail(context, e);
                }
            })
        }

        /// # Safety
        ///
        /// `pme` must be a live, set-up instance; `parameters` must hold
        /// nAtoms × nCartesian(angmom) values and `coordinates` nAtoms × 3,
        /// both row-major, and stay valid for the duration of the call.
        #[no_mangle]
        pub unsafe extern "C" fn $e_rec(
            pme: *mut $handle,
            n_atoms: c_int,
            parameter_ang_mom: c_int,
            parameters: *const $real,
            coordinates: *const $real,
        ) -> $real {
            let context = stringify!($e_rec);
            let handle = unsafe { handle_mut(pme, context) };
            let n_atoms = checked_count(context, "nAtoms", n_atoms);
            let angmom = checked_count(context, "parameterAngMom", parameter_ang_mom);
            let n_params = n_cartesian(angmom);
            let parameters = unsafe { slice::from_raw_parts(parameters, n_atoms * n_params) };
            let coordinates = unsafe { slice::from_raw_parts(coordinates, n_atoms * 3) };
            guarded(context, || {
                let params = view_or_die(context, n_atoms, n_params, parameters);
                let coords = view_or_die(context, n_atoms, 3, coordinates);
                match handle.engine(context).compute_e_rec(angmom, params, coords) {
                    Ok(energy) => energy,
                    Err(e) => fail(context, e),
                }
            })
        }

        /// # Safety
        ///
        /// As for the energy-only call; `forces` must additionally point at
        /// nAtoms × 3 writable values, which are accumulated into.
        #[no_mangle]
        pub unsafe extern "C" fn $ef_rec(
            pme: *mut $handle,
            n_atoms: c_int,
            parameter_ang_mom: c_int,
            parameters: *const $real,
            coordinates: *const $real,
            forces: *mut $real,
        ) -> $real {
            let context = stringify!($ef_rec);
            let handle = unsafe { handle_mut(pme, context) };
            let n_atoms = checked_count(context, "nAtoms", n_atoms);
            let angmom = checked_count(context, "parameterAngMom", parameter_ang_mom);
            let n_params = n_cartesian(angmom);
            let parameters = unsafe { slice::from_raw_parts(parameters, n_atoms * n_params) };
            let coordinates = unsafe { slice::from_raw_parts(coordinates, n_atoms * 3) };
            let forces = unsafe { slice::from_raw_parts_mut(forces, n_atoms * 3) };
            guarded(context, || {
                let params = view_or_die(context, n_atoms, n_params, parameters);
                let coords = view_or_die(context, n_atoms, 3, coordinates);
                let forces = match MatrixViewMut::new(n_atoms, 3, forces) {
                    Ok(view) => view,
                    Err(e) => fail(context, e),
                };
                match handle
                    .engine(context)
                    .compute_ef_rec(angmom, params, coords, forces)
                {
                    Ok(energy) => energy,
                    Err(e) => fail(context, e),
                }
            })
        }

        /// # Safety
        ///
        /// As for the energy/force call; `virial` must point at six writable
        /// values (xx, xy, xz, yy, yz, zz), which are accumulated into.
        #[no_mangle]
        pub unsafe extern "C" fn $efv_rec(
            pme: *mut $handle,
            n_atoms: c_int,
            parameter_ang_mom: c_int,
            parameters: *const $real,
            coordinates: *const $real,
            forces: *mut $real,
            virial: *mut $real,
        ) -> $real {
            let context = stringify!($efv_rec);
            let handle = unsafe { handle_mut(pme, context) };
            let n_atoms = checked_count(context, "nAtoms", n_atoms);
            let angmom = checked_count(context, "parameterAngMom", parameter_ang_mom);
            let n_params = n_cartesian(angmom);
            let parameters = unsafe { slice::from_raw_parts(parameters, n_atoms * n_params) };
            let coordinates = unsafe { slice::from_raw_parts(coordinates, n_atoms * 3) };
            let forces = unsafe { slice::from_raw_parts_mut(forces, n_atoms * 3) };
            let virial = unsafe { &mut *(virial as *mut [$real; 6]) };
            guarded(context, || {
                let params = view_or_die(context, n_atoms, n_params, parameters);
                let coords = view_or_die(context, n_atoms, 3, coordinates);
                let forces = match MatrixViewMut::new(n_atoms, 3, forces) {
                    Ok(view) => view,
                    Err(e) => fail(context, e),
                };
                match handle
                    .engine(context)
                    .compute_efv_rec(angmom, params, coords, forces, virial)
                {
                    Ok(energy) => energy,
                    Err(e) => fail(context, e),
                }
            })
        }

        /// # Safety
        ///
        /// As for the energy-only call; `grid_points` must hold
        /// nGridPoints × 3 probe coordinates and `potential` must point at
        /// nGridPoints × nCartesian(derivativeLevel) writable values, which
        /// are overwritten.
        #[no_mangle]
        pub unsafe extern "C" fn $p_rec(
            pme: *mut $handle,
            n_atoms: c_int,
            parameter_ang_mom: c_int,
            parameters: *const $real,
            coordinates: *const $real,
            n_grid_points: c_int,
            grid_points: *const $real,
            derivative_level: c_int,
            potential: *mut $real,
        ) {
            let context = stringify!($p_rec);
            let handle = unsafe { handle_mut(pme, context) };
            let n_atoms = checked_count(context, "nAtoms", n_atoms);
            let angmom = checked_count(context, "parameterAngMom", parameter_ang_mom);
            let n_probes = checked_count(context, "nGridPoints", n_grid_points);
            let deriv_level = checked_count(context, "derivativeLevel", derivative_level);
            let n_params = n_cartesian(angmom);
            let n_out = n_cartesian(deriv_level);
            let parameters = unsafe { slice::from_raw_parts(parameters, n_atoms * n_params) };
            let coordinates = unsafe { slice::from_raw_parts(coordinates, n_atoms * 3) };
            let grid_points = unsafe { slice::from_raw_parts(grid_points, n_probes * 3) };
            let potential = unsafe { slice::from_raw_parts_mut(potential, n_probes * n_out) };
            guarded(context, || {
                let params = view_or_die(context, n_atoms, n_params, parameters);
                let coords = view_or_die(context, n_atoms, 3, coordinates);
                let probes = view_or_die(context, n_probes, 3, grid_points);
                let result: Matrix<$real> = match handle
                    .engine(context)
                    .compute_p_rec(angmom, params, coords, probes, deriv_level)
                {
                    Ok(matrix) => matrix,
                    Err(e) => fail(context, e),
                };
                potential.copy_from_slice(result.data());
            })
        }

        /// # Safety
        ///
        /// `pme` must be a pointer obtained from the matching create call;
        /// it must not be used again afterwards. Null is ignored.
        #[no_mangle]
        pub unsafe extern "C" fn $destroy(pme: *mut $handle) {
            if !pme.is_null() {
                drop(unsafe { Box::from_raw(pme) });
            }
        }
    };
}

/// Shared null check for handle pointers.
///
/// # Safety
///
/// Non-null `pme` must point at a live handle.
unsafe fn handle_mut<'a, H>(pme: *mut H, context: &'static str) -> &'a mut H {
    if pme.is_null() {
        fail(context, "null instance pointer");
    }
    unsafe { &mut *pme }
}

flat_boundary!(
    f64,
    KspacePmeD,
    kspace_create_d,
    kspace_setup_d,
    kspace_set_lattice_vectors_d,
    kspace_compute_e_rec_d,
    kspace_compute_ef_rec_d,
    kspace_compute_efv_rec_d,
    kspace_compute_p_rec_d,
    kspace_destroy_d
);

flat_boundary!(
    f32,
    KspacePmeF,
    kspace_create_f,
    kspace_setup_f,
    kspace_set_lattice_vectors_f,
    kspace_compute_e_rec_f,
    kspace_compute_ef_rec_f,
    kspace_compute_efv_rec_f,
    kspace_compute_p_rec_f,
    kspace_destroy_f
);
