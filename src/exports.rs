//! `extern "C"` entry points of the bundled behaviours, one per solver
//! signature.
//!
//! Solvers cannot hand a parameter store through their calling
//! conventions, so the entry points read the process-wide store of their
//! behaviour, modified through the `<behaviour>_set_parameter` family.
//! Integrations only take a read lock.
#![allow(clippy::missing_safety_doc)]
use crate::cohesive::LinearCohesiveZone;
use crate::finitestrain::{HenckyElasticity, SaintVenantKirchhoff};
use crate::hypothesis::ModellingHypothesis;
use crate::interfaces::Behaviour;
use crate::parameters::ParameterStore;
use crate::smallstrain::{Elasticity, MisesPlasticity, OrthotropicElasticity, ThermoElasticity};
use crate::solvers::abaqus::{self, AbaqusCall};
use crate::solvers::calculix::{self, CalculiXCall, ORIENTATION_SIZE, PACKED_STIFFNESS_SIZE};
use crate::solvers::castem::{self, CastemCall};
use crate::solvers::generic::{self, GenericBehaviourData, GenericCall, GenericSizes};
use crate::solvers::openradioss::{self, OpenRadiossCall};
use crate::stress_free_expansion::StressFreeExpansionFn;
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::{OnceLock, PoisonError, RwLock};

fn stores() -> &'static RwLock<BTreeMap<&'static str, ParameterStore>> {
    static STORES: OnceLock<RwLock<BTreeMap<&'static str, ParameterStore>>> = OnceLock::new();
    STORES.get_or_init(|| RwLock::new(BTreeMap::new()))
}

/// Runs `f` with the parameters of `B`.
pub fn with_parameters<B: Behaviour, R>(f: impl FnOnce(&ParameterStore) -> R) -> R {
    let stores = stores().read().unwrap_or_else(PoisonError::into_inner);
    match stores.get(B::NAME) {
        Some(store) => f(store),
        None => f(&ParameterStore::new()),
    }
}

/// Modifies the parameters of `B`.
pub fn update_parameters<B: Behaviour>(f: impl FnOnce(&mut ParameterStore)) {
    let mut stores = stores().write().unwrap_or_else(PoisonError::into_inner);
    f(stores.entry(B::NAME).or_default());
}

unsafe fn name<'a>(p: *const c_char) -> Option<&'a str> {
    if p.is_null() {
        return None;
    }
    CStr::from_ptr(p).to_str().ok()
}

unsafe fn slice<'a>(p: *const f64, n: usize) -> &'a [f64] {
    if n == 0 || p.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(p, n)
    }
}

unsafe fn slice_mut<'a>(p: *mut f64, n: usize) -> &'a mut [f64] {
    if n == 0 || p.is_null() {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(p, n)
    }
}

fn size(n: i32) -> usize {
    n.max(0) as usize
}

/// `<behaviour>_set_parameter` and friends. They return 1 on success, 0 if
/// the name or the value is invalid.
macro_rules! parameter_entries {
    ($behaviour:ty, $real:ident, $integer:ident, $unsigned:ident, $json:ident) => {
        #[no_mangle]
        pub unsafe extern "C" fn $real(key: *const c_char, value: f64) -> i32 {
            match name(key) {
                Some(key) => {
                    update_parameters::<$behaviour>(|store| store.set_parameter(key, value));
                    1
                }
                None => 0,
            }
        }

        #[no_mangle]
        pub unsafe extern "C" fn $integer(key: *const c_char, value: i32) -> i32 {
            match name(key) {
                Some(key) => {
                    update_parameters::<$behaviour>(|store| store.set_integer_parameter(key, value));
                    1
                }
                None => 0,
            }
        }

        #[no_mangle]
        pub unsafe extern "C" fn $unsigned(key: *const c_char, value: u16) -> i32 {
            match name(key) {
                Some(key) => {
                    update_parameters::<$behaviour>(|store| store.set_unsigned_integer_parameter(key, value));
                    1
                }
                None => 0,
            }
        }

        /// Replaces every parameter by the ones of a JSON document.
        #[no_mangle]
        pub unsafe extern "C" fn $json(json: *const c_char) -> i32 {
            let parsed = name(json).map(ParameterStore::from_json);
            match parsed {
                Some(Ok(store)) => {
                    update_parameters::<$behaviour>(|s| *s = store);
                    1
                }
                Some(Err(e)) => {
                    tracing::warn!(behaviour = <$behaviour>::NAME, "{e}");
                    0
                }
                None => 0,
            }
        }
    };
}

/// Castem UMAT. The trailing argument is the optional stress-free
/// expansion handler.
macro_rules! castem_entry {
    ($name:ident, $behaviour:ty) => {
        castem_entry!($name, $behaviour, umat);
    };
    ($name:ident, $behaviour:ty, $umat:ident) => {
        #[no_mangle]
        #[allow(clippy::too_many_arguments)]
        pub unsafe extern "C" fn $name(
            stress: *mut f64,
            statev: *mut f64,
            ddsdde: *mut f64,
            _sse: *mut f64,
            _spd: *mut f64,
            _scd: *mut f64,
            _rpl: *mut f64,
            _ddsddt: *mut f64,
            _drplde: *mut f64,
            _drpldt: *mut f64,
            stran: *const f64,
            dstran: *const f64,
            _time: *const f64,
            dtime: *const f64,
            temp: *const f64,
            dtemp: *const f64,
            predef: *const f64,
            dpred: *const f64,
            _cmname: *const c_char,
            ndi: *const i32,
            _nshr: *const i32,
            ntens: *const i32,
            nstatv: *const i32,
            props: *const f64,
            nprops: *const i32,
            _coords: *const f64,
            drot: *const f64,
            pnewdt: *mut f64,
            _celent: *const f64,
            dfgrd0: *const f64,
            dfgrd1: *const f64,
            _noel: *const i32,
            _npt: *const i32,
            _layer: *const i32,
            _kspt: *const i32,
            _kstep: *const i32,
            kinc: *mut i32,
            sfeh: Option<StressFreeExpansionFn>,
        ) {
            let n = size(*ntens);
            let call = CastemCall {
                stress: slice_mut(stress, n),
                statev: slice_mut(statev, size(*nstatv)),
                ddsdde: slice_mut(ddsdde, n * n),
                stran: slice(stran, n),
                dstran: slice(dstran, n),
                dfgrd0: slice(dfgrd0, 9),
                dfgrd1: slice(dfgrd1, 9),
                dtime: *dtime,
                temperature: *temp,
                temperature_increment: *dtemp,
                predef: slice(predef, 0),
                dpred: slice(dpred, 0),
                ndi: *ndi,
                ntens: n,
                props: slice(props, size(*nprops)),
                drot: slice(drot, 9),
                pnewdt: &mut *pnewdt,
            };
            *kinc = with_parameters::<$behaviour, _>(|p| castem::$umat::<$behaviour>(call, sfeh, p));
        }
    };
}

/// Abaqus/Standard UMAT for one modelling hypothesis.
macro_rules! abaqus_entry {
    ($name:ident, $behaviour:ty, $hypothesis:ident) => {
        #[no_mangle]
        #[allow(clippy::too_many_arguments)]
        pub unsafe extern "C" fn $name(
            stress: *mut f64,
            statev: *mut f64,
            ddsdde: *mut f64,
            _sse: *mut f64,
            _spd: *mut f64,
            _scd: *mut f64,
            _rpl: *mut f64,
            _ddsddt: *mut f64,
            _drplde: *mut f64,
            _drpldt: *mut f64,
            stran: *const f64,
            dstran: *const f64,
            _time: *const f64,
            dtime: *const f64,
            temp: *const f64,
            dtemp: *const f64,
            predef: *const f64,
            dpred: *const f64,
            _cmname: *const c_char,
            _ndi: *const i32,
            _nshr: *const i32,
            ntens: *const i32,
            nstatv: *const i32,
            props: *const f64,
            nprops: *const i32,
            _coords: *const f64,
            _drot: *const f64,
            pnewdt: *mut f64,
            _celent: *const f64,
            dfgrd0: *const f64,
            dfgrd1: *const f64,
            _noel: *const i32,
            _npt: *const i32,
            _layer: *const i32,
            _kspt: *const i32,
            _kstep: *const i32,
            _kinc: *const i32,
        ) {
            let n = size(*ntens);
            let call = AbaqusCall {
                stress: slice_mut(stress, n),
                statev: slice_mut(statev, size(*nstatv)),
                ddsdde: slice_mut(ddsdde, n * n),
                stran: slice(stran, n),
                dstran: slice(dstran, n),
                dfgrd0: slice(dfgrd0, 9),
                dfgrd1: slice(dfgrd1, 9),
                dtime: *dtime,
                temperature: *temp,
                temperature_increment: *dtemp,
                predef: slice(predef, 0),
                dpred: slice(dpred, 0),
                ntens: n,
                props: slice(props, size(*nprops)),
                pnewdt: &mut *pnewdt,
            };
            with_parameters::<$behaviour, _>(|p| {
                abaqus::umat::<$behaviour>(call, ModellingHypothesis::$hypothesis, p)
            });
        }
    };
}

macro_rules! calculix_entry {
    ($name:ident, $behaviour:ty) => {
        #[no_mangle]
        #[allow(clippy::too_many_arguments)]
        pub unsafe extern "C" fn $name(
            _amat: *const c_char,
            _iel: *const i32,
            _iint: *const i32,
            nprops: *const i32,
            elconloc: *const f64,
            emec: *const f64,
            emec0: *const f64,
            _beta: *const f64,
            xokl: *const f64,
            _voj: *const f64,
            xkl: *const f64,
            _vj: *const f64,
            _ithermal: *const i32,
            t1l: *const f64,
            dtime: *const f64,
            _time: *const f64,
            _ttime: *const f64,
            _icmd: *const i32,
            _ielas: *const i32,
            _mi: *const i32,
            nstatv: *const i32,
            xstateini: *const f64,
            xstate: *mut f64,
            stre: *mut f64,
            stiff: *mut f64,
            iorien: *const i32,
            pgauss: *const f64,
            orab: *const f64,
            pnewdt: *mut f64,
            _ipkon: *const i32,
        ) {
            let nstatv = size(*nstatv);
            let call = CalculiXCall {
                elconloc: slice(elconloc, size(*nprops)),
                emec0: slice(emec0, 6),
                emec: slice(emec, 6),
                xokl: slice(xokl, 9),
                xkl: slice(xkl, 9),
                t1l: *t1l,
                dtime: *dtime,
                xstateini: slice(xstateini, nstatv),
                xstate: slice_mut(xstate, nstatv),
                stre: slice_mut(stre, 6),
                stiff: slice_mut(stiff, PACKED_STIFFNESS_SIZE),
                iorien: *iorien,
                pgauss: slice(pgauss, 3),
                orab: slice(orab, size(*iorien) * ORIENTATION_SIZE),
                pnewdt: &mut *pnewdt,
            };
            with_parameters::<$behaviour, _>(|p| {
                calculix::umat::<$behaviour>(call, ModellingHypothesis::Tridimensional, p)
            });
        }
    };
}

macro_rules! openradioss_entry {
    ($name:ident, $behaviour:ty) => {
        #[no_mangle]
        #[allow(clippy::too_many_arguments)]
        pub unsafe extern "C" fn $name(
            nel: *const i32,
            nuparam: *const i32,
            uparam: *const f64,
            nuvar: *const i32,
            uvar: *mut f64,
            timestep: *const f64,
            temperature: *const f64,
            deps: *const f64,
            sig0: *const f64,
            sig1: *mut f64,
        ) -> i32 {
            let nel = size(*nel);
            let nuvar = size(*nuvar);
            let call = OpenRadiossCall {
                nel,
                dt: *timestep,
                temperature: slice(temperature, nel),
                props: slice(uparam, size(*nuparam)),
                deps: slice(deps, 6 * nel),
                sig0: slice(sig0, 6 * nel),
                sig1: slice_mut(sig1, 6 * nel),
                uvar: slice_mut(uvar, nuvar * nel),
                nuvar,
            };
            with_parameters::<$behaviour, _>(|p| openradioss::mat_user::<$behaviour>(call, p))
        }
    };
}

/// Generic interface for one modelling hypothesis.
macro_rules! generic_entry {
    ($name:ident, $behaviour:ty, $hypothesis:ident) => {
        #[no_mangle]
        pub unsafe extern "C" fn $name(d: *mut GenericBehaviourData) -> i32 {
            let Some(d) = d.as_mut() else {
                return -1;
            };
            let h = ModellingHypothesis::$hypothesis;
            let sizes = match GenericSizes::of::<$behaviour>(h) {
                Ok(sizes) => sizes,
                Err(e) => {
                    generic::write_error_message(d.error_message, &e.to_string());
                    return -1;
                }
            };
            let message = d.error_message;
            let call = match GenericCall::from_raw(d, &sizes) {
                Ok(call) => call,
                Err(e) => {
                    generic::write_error_message(message, &e.to_string());
                    return -1;
                }
            };
            let status = with_parameters::<$behaviour, _>(|p| generic::integrate::<$behaviour>(call, h, p));
            if let Some(m) = &status.message {
                generic::write_error_message(message, m);
            }
            status.code
        }
    };
}

parameter_entries!(
    Elasticity,
    elasticity_set_parameter,
    elasticity_set_integer_parameter,
    elasticity_set_unsigned_integer_parameter,
    elasticity_set_parameters_from_json
);
castem_entry!(umatelasticity, Elasticity);
castem_entry!(umatelasticity_frst, Elasticity, umat_finite_rotation_small_strain);
abaqus_entry!(elasticity_abaqus_3d, Elasticity, Tridimensional);
abaqus_entry!(elasticity_abaqus_planestrain, Elasticity, PlaneStrain);
abaqus_entry!(elasticity_abaqus_planestress, Elasticity, PlaneStress);
abaqus_entry!(elasticity_abaqus_axisymmetrical, Elasticity, Axisymmetrical);
calculix_entry!(elasticity_calculix, Elasticity);
openradioss_entry!(elasticity_openradioss, Elasticity);
generic_entry!(elasticity_generic_tridimensional, Elasticity, Tridimensional);
generic_entry!(elasticity_generic_planestrain, Elasticity, PlaneStrain);
generic_entry!(elasticity_generic_planestress, Elasticity, PlaneStress);
generic_entry!(elasticity_generic_axisymmetrical, Elasticity, Axisymmetrical);

parameter_entries!(
    OrthotropicElasticity,
    orthotropicelasticity_set_parameter,
    orthotropicelasticity_set_integer_parameter,
    orthotropicelasticity_set_unsigned_integer_parameter,
    orthotropicelasticity_set_parameters_from_json
);
castem_entry!(umatorthotropicelasticity, OrthotropicElasticity);
abaqus_entry!(orthotropicelasticity_abaqus_3d, OrthotropicElasticity, Tridimensional);
abaqus_entry!(orthotropicelasticity_abaqus_planestrain, OrthotropicElasticity, PlaneStrain);
calculix_entry!(orthotropicelasticity_calculix, OrthotropicElasticity);
generic_entry!(orthotropicelasticity_generic_tridimensional, OrthotropicElasticity, Tridimensional);

parameter_entries!(
    ThermoElasticity,
    thermoelasticity_set_parameter,
    thermoelasticity_set_integer_parameter,
    thermoelasticity_set_unsigned_integer_parameter,
    thermoelasticity_set_parameters_from_json
);
castem_entry!(umatthermoelasticity, ThermoElasticity);
abaqus_entry!(thermoelasticity_abaqus_3d, ThermoElasticity, Tridimensional);
calculix_entry!(thermoelasticity_calculix, ThermoElasticity);
openradioss_entry!(thermoelasticity_openradioss, ThermoElasticity);
generic_entry!(thermoelasticity_generic_tridimensional, ThermoElasticity, Tridimensional);

parameter_entries!(
    MisesPlasticity,
    misesplasticity_set_parameter,
    misesplasticity_set_integer_parameter,
    misesplasticity_set_unsigned_integer_parameter,
    misesplasticity_set_parameters_from_json
);
castem_entry!(umatmisesplasticity, MisesPlasticity);
castem_entry!(umatmisesplasticity_frst, MisesPlasticity, umat_finite_rotation_small_strain);
abaqus_entry!(misesplasticity_abaqus_3d, MisesPlasticity, Tridimensional);
abaqus_entry!(misesplasticity_abaqus_planestrain, MisesPlasticity, PlaneStrain);
abaqus_entry!(misesplasticity_abaqus_axisymmetrical, MisesPlasticity, Axisymmetrical);
calculix_entry!(misesplasticity_calculix, MisesPlasticity);
openradioss_entry!(misesplasticity_openradioss, MisesPlasticity);
generic_entry!(misesplasticity_generic_tridimensional, MisesPlasticity, Tridimensional);
generic_entry!(misesplasticity_generic_planestrain, MisesPlasticity, PlaneStrain);

parameter_entries!(
    SaintVenantKirchhoff,
    saintvenantkirchhoff_set_parameter,
    saintvenantkirchhoff_set_integer_parameter,
    saintvenantkirchhoff_set_unsigned_integer_parameter,
    saintvenantkirchhoff_set_parameters_from_json
);
abaqus_entry!(saintvenantkirchhoff_abaqus_3d, SaintVenantKirchhoff, Tridimensional);
abaqus_entry!(saintvenantkirchhoff_abaqus_planestrain, SaintVenantKirchhoff, PlaneStrain);
abaqus_entry!(saintvenantkirchhoff_abaqus_planestress, SaintVenantKirchhoff, PlaneStress);
castem_entry!(umatsaintvenantkirchhoff, SaintVenantKirchhoff);
calculix_entry!(saintvenantkirchhoff_calculix, SaintVenantKirchhoff);
generic_entry!(saintvenantkirchhoff_generic_tridimensional, SaintVenantKirchhoff, Tridimensional);

parameter_entries!(
    HenckyElasticity,
    henckyelasticity_set_parameter,
    henckyelasticity_set_integer_parameter,
    henckyelasticity_set_unsigned_integer_parameter,
    henckyelasticity_set_parameters_from_json
);
abaqus_entry!(henckyelasticity_abaqus_3d, HenckyElasticity, Tridimensional);
calculix_entry!(henckyelasticity_calculix, HenckyElasticity);
generic_entry!(henckyelasticity_generic_tridimensional, HenckyElasticity, Tridimensional);

parameter_entries!(
    LinearCohesiveZone,
    linearcohesivezone_set_parameter,
    linearcohesivezone_set_integer_parameter,
    linearcohesivezone_set_unsigned_integer_parameter,
    linearcohesivezone_set_parameters_from_json
);
castem_entry!(umatlinearcohesivezone, LinearCohesiveZone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::generic::{GenericState, ERROR_MESSAGE_LENGTH};
    use approx::assert_relative_eq;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn parameters_are_set_per_behaviour() {
        let key = CString::new("reference_opening").unwrap();
        assert_eq!(unsafe { linearcohesivezone_set_parameter(key.as_ptr(), 1e-3) }, 1);
        assert_eq!(
            with_parameters::<LinearCohesiveZone, _>(|p| p.parameter("reference_opening")),
            Some(1e-3)
        );
        assert_eq!(with_parameters::<Elasticity, _>(|p| p.parameter("reference_opening")), None);
        assert_eq!(unsafe { linearcohesivezone_set_parameter(ptr::null(), 1.0) }, 0);
        let json = CString::new("{").unwrap();
        assert_eq!(unsafe { linearcohesivezone_set_parameters_from_json(json.as_ptr()) }, 0);
        let key = CString::new("OutOfBoundsPolicy").unwrap();
        assert_eq!(unsafe { linearcohesivezone_set_unsigned_integer_parameter(key.as_ptr(), 1) }, 1);
        assert_eq!(
            with_parameters::<LinearCohesiveZone, _>(|p| p.unsigned_integer_parameter("OutOfBoundsPolicy")),
            Some(1)
        );
    }

    #[test]
    fn integer_parameters() {
        let key = CString::new("maximum_iterations").unwrap();
        assert_eq!(unsafe { henckyelasticity_set_integer_parameter(key.as_ptr(), -3) }, 1);
        assert_eq!(
            with_parameters::<HenckyElasticity, _>(|p| p.integer_parameter("maximum_iterations")),
            Some(-3)
        );
        assert_eq!(with_parameters::<Elasticity, _>(|p| p.integer_parameter("maximum_iterations")), None);
        assert_eq!(unsafe { henckyelasticity_set_integer_parameter(ptr::null(), 1) }, 0);
    }

    #[test]
    fn castem_entry_point() {
        let mut stress = [0.0; 6];
        let mut statev = [0.0; 1];
        let mut ddsdde = [0.0; 36];
        ddsdde[0] = 1.0;
        let stran = [0.0; 6];
        let dstran = [1e-3, 0.0, 0.0, 0.0, 0.0, 0.0];
        let props = [200e3, 0.3, 7800.0, 0.0];
        let drot = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let (dtime, temp, dtemp) = (1.0, 293.15, 0.0);
        let (ndi, nshr, ntens, nstatv, nprops) = (2, 3, 6, 1, 4);
        let mut pnewdt = 1.0;
        let mut kinc = 0;
        let mut scratch = 0.0;
        let s: *mut f64 = &mut scratch;
        unsafe {
            umatelasticity(
                stress.as_mut_ptr(),
                statev.as_mut_ptr(),
                ddsdde.as_mut_ptr(),
                s,
                s,
                s,
                s,
                s,
                s,
                s,
                stran.as_ptr(),
                dstran.as_ptr(),
                ptr::null(),
                &dtime,
                &temp,
                &dtemp,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &ndi,
                &nshr,
                &ntens,
                &nstatv,
                props.as_ptr(),
                &nprops,
                ptr::null(),
                drot.as_ptr(),
                &mut pnewdt,
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                &mut kinc,
                None,
            )
        };
        assert_eq!(kinc, 1);
        assert_relative_eq!(stress[0], 269.2307692307692, max_relative = 1e-12);
    }

    #[test]
    fn generic_entry_point_reports_errors() {
        let mut message = vec![0 as c_char; ERROR_MESSAGE_LENGTH];
        let mut k = [0.0; 36];
        let mut rdt = 1.0;
        let mut g0 = [0.0; 6];
        let mut g1 = [1e-3, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut f0 = [0.0; 6];
        let mut f1 = [0.0; 6];
        let mut props = [200e3, 0.3];
        let mut t = [293.15];
        let state = |g: &mut [f64], f: &mut [f64], p: &mut [f64], t: &mut [f64]| GenericState {
            gradients: g.as_mut_ptr(),
            thermodynamic_forces: f.as_mut_ptr(),
            material_properties: p.as_mut_ptr(),
            internal_state_variables: ptr::null_mut(),
            stored_energy: ptr::null_mut(),
            dissipated_energy: ptr::null_mut(),
            external_state_variables: t.as_mut_ptr(),
        };
        let mut t1 = t;
        let mut props1 = props;
        let mut d = GenericBehaviourData {
            error_message: message.as_mut_ptr(),
            dt: 1.0,
            k: k.as_mut_ptr(),
            rdt: &mut rdt,
            speed_of_sound: ptr::null_mut(),
            s0: state(&mut g0, &mut f0, &mut props, &mut t),
            s1: state(&mut g1, &mut f1, &mut props1, &mut t1),
        };
        assert_eq!(unsafe { elasticity_generic_tridimensional(&mut d) }, 1);
        assert_relative_eq!(f1[0], 269.2307692307692, max_relative = 1e-12);

        d.dt = -1.0;
        assert_eq!(unsafe { elasticity_generic_tridimensional(&mut d) }, -1);
        let text = unsafe { CStr::from_ptr(message.as_ptr()) }.to_str().unwrap();
        assert!(text.contains("negative time step"));
    }
}
