//! Solver configuration read from a TOML document.
//!
//! ```toml
//! loglevel = "info"
//!
//! [solver]
//! type = "gmres"        # cg | bicgstab | gmres | fgmres | minres
//! max_iter = 500
//! rel_tol = 1e-8
//! restart = 30
//! gmres_mode = "right"  # left | right
//! min_restart = 10      # min_restart and max_restart switch on adaptive restart
//! max_restart = 40
//!
//! [preconditioner]
//! type = "amg"          # identity | jacobi | sor | ssor | amg | sparselu | denselu
//! weight = 1.0
//! sweeps = 1
//!
//! [amg]
//! coarse_dof = 50
//! cycle = "w"
//! smoother = "ssor"
//! ```
//! Every key is optional; missing keys keep the defaults of `SolverParams` and
//! `AmgParams`. Unknown sections and keys are rejected so that a misspelled key never
//! silently falls back to a default.
use crate::krylov::gmres::GmresMode;
use crate::krylov::params::SolverParams;
use crate::krylov::solver_api::SolverType;
use crate::linalg::errors::LinAlgError;
use crate::multigrid::amg::AmgParams;
use crate::operators::preconditioner::PrecondType;
use log::info;
use std::path::Path;
use std::str::FromStr;
use toml::{Table, Value};

const SECTIONS: [&str; 4] = ["loglevel", "solver", "preconditioner", "amg"];
const SOLVER_KEYS: [&str; 12] = [
    "type",
    "max_iter",
    "min_iter",
    "safe_iter",
    "sav_iter",
    "rel_tol",
    "abs_tol",
    "restart",
    "max_stag",
    "gmres_mode",
    "min_restart",
    "max_restart",
];
const PRECOND_KEYS: [&str; 3] = ["type", "weight", "sweeps"];
const AMG_KEYS: [&str; 11] = [
    "max_levels",
    "coarse_dof",
    "strength_threshold",
    "cycle",
    "cycles",
    "smoother",
    "smoother_weight",
    "pre_sweeps",
    "post_sweeps",
    "coarse_solver",
    "coarse_sweeps",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    pub solver: SolverType,
    /// iteration controls; `params.precond` selects the preconditioner
    pub params: SolverParams,
    pub gmres_mode: GmresMode,
    /// adaptive restart window for GMRES and FGMRES
    pub restart_bounds: Option<(usize, usize)>,
    /// relaxation weight of the Jacobi / SOR / SSOR preconditioners
    pub precond_weight: f64,
    pub precond_sweeps: usize,
    pub amg: AmgParams,
    pub loglevel: Option<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            solver: SolverType::Cg,
            params: SolverParams::default(),
            gmres_mode: GmresMode::default(),
            restart_bounds: None,
            precond_weight: 1.0,
            precond_sweeps: 1,
            amg: AmgParams::default(),
            loglevel: None,
        }
    }
}

impl SolverConfig {
    pub fn new(solver: SolverType) -> Self {
        SolverConfig {
            solver,
            ..Self::default()
        }
    }
    pub fn with_params(mut self, params: SolverParams) -> Self {
        self.params = params;
        self
    }
    pub fn with_precond(mut self, precond: PrecondType) -> Self {
        self.params.precond = precond;
        self
    }
    pub fn with_relaxation(mut self, weight: f64, sweeps: usize) -> Self {
        self.precond_weight = weight;
        self.precond_sweeps = sweeps;
        self
    }
    pub fn with_gmres_mode(mut self, mode: GmresMode) -> Self {
        self.gmres_mode = mode;
        self
    }
    pub fn with_restart_bounds(mut self, min_restart: usize, max_restart: usize) -> Self {
        self.restart_bounds = Some((min_restart, max_restart));
        self
    }
    pub fn with_amg(mut self, amg: AmgParams) -> Self {
        self.amg = amg;
        self
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LinAlgError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LinAlgError::Io(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        info!("solver configuration read from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, LinAlgError> {
        let table: Table = text.parse()?;
        check_keys("configuration", &table, &SECTIONS)?;
        let mut config = SolverConfig::default();

        if let Some(level) = table.get("loglevel") {
            config.loglevel = Some(as_str("loglevel", level)?.to_string());
        }

        if let Some(section) = get_section(&table, "solver")? {
            check_keys("[solver]", section, &SOLVER_KEYS)?;
            if let Some(v) = section.get("type") {
                let name = as_str("solver.type", v)?;
                config.solver = SolverType::from_str(name)
                    .map_err(|_| LinAlgError::UnknownSolverType(name.to_string()))?;
            }
            let p = &mut config.params;
            read_usize(section, "solver", "max_iter", &mut p.max_iter)?;
            read_usize(section, "solver", "min_iter", &mut p.min_iter)?;
            read_usize(section, "solver", "safe_iter", &mut p.safe_iter)?;
            read_usize(section, "solver", "sav_iter", &mut p.sav_iter)?;
            read_f64(section, "solver", "rel_tol", &mut p.rel_tol)?;
            read_f64(section, "solver", "abs_tol", &mut p.abs_tol)?;
            read_usize(section, "solver", "restart", &mut p.restart)?;
            read_usize(section, "solver", "max_stag", &mut p.max_stag)?;
            read_parsed(section, "solver", "gmres_mode", &mut config.gmres_mode)?;
            match (section.get("min_restart"), section.get("max_restart")) {
                (None, None) => {}
                (Some(lo), Some(hi)) => {
                    config.restart_bounds = Some((
                        as_usize("solver.min_restart", lo)?,
                        as_usize("solver.max_restart", hi)?,
                    ));
                }
                _ => {
                    return Err(LinAlgError::ConfigFile(
                        "min_restart and max_restart must be given together".to_string(),
                    ));
                }
            }
        }

        if let Some(section) = get_section(&table, "preconditioner")? {
            check_keys("[preconditioner]", section, &PRECOND_KEYS)?;
            if let Some(v) = section.get("type") {
                let name = as_str("preconditioner.type", v)?;
                config.params.precond = PrecondType::from_str(name)
                    .map_err(|_| LinAlgError::UnknownPrecondType(name.to_string()))?;
            }
            read_f64(section, "preconditioner", "weight", &mut config.precond_weight)?;
            read_usize(section, "preconditioner", "sweeps", &mut config.precond_sweeps)?;
        }

        if let Some(section) = get_section(&table, "amg")? {
            check_keys("[amg]", section, &AMG_KEYS)?;
            let amg = &mut config.amg;
            read_usize(section, "amg", "max_levels", &mut amg.max_levels)?;
            read_usize(section, "amg", "coarse_dof", &mut amg.coarse_dof)?;
            read_f64(section, "amg", "strength_threshold", &mut amg.strength_threshold)?;
            let mg = &mut amg.mg;
            read_parsed(section, "amg", "cycle", &mut mg.cycle)?;
            read_usize(section, "amg", "cycles", &mut mg.cycles)?;
            read_parsed(section, "amg", "smoother", &mut mg.smoother)?;
            read_f64(section, "amg", "smoother_weight", &mut mg.smoother_weight)?;
            read_usize(section, "amg", "pre_sweeps", &mut mg.pre_sweeps)?;
            read_usize(section, "amg", "post_sweeps", &mut mg.post_sweeps)?;
            read_parsed(section, "amg", "coarse_solver", &mut mg.coarse_solver)?;
            read_usize(section, "amg", "coarse_sweeps", &mut mg.coarse_sweeps)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LinAlgError> {
        self.params.validate()?;
        if let Some((lo, hi)) = self.restart_bounds {
            if lo == 0 || lo > hi {
                return Err(LinAlgError::InputParam(format!(
                    "restart bounds must satisfy 1 <= min_restart <= max_restart, got [{}, {}]",
                    lo, hi
                )));
            }
        }
        if !(self.precond_weight > 0.0 && self.precond_weight < 2.0) {
            return Err(LinAlgError::InputParam(format!(
                "relaxation weight must be in (0, 2), got {}",
                self.precond_weight
            )));
        }
        if self.precond_sweeps == 0 {
            return Err(LinAlgError::InputParam(
                "preconditioner sweeps must be at least 1".to_string(),
            ));
        }
        self.amg.validate()
    }
}

fn check_keys(place: &str, table: &Table, allowed: &[&str]) -> Result<(), LinAlgError> {
    match table.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(k) => Err(LinAlgError::ConfigFile(format!(
            "unknown key '{}' in {}",
            k, place
        ))),
        None => Ok(()),
    }
}

fn get_section<'t>(table: &'t Table, name: &str) -> Result<Option<&'t Table>, LinAlgError> {
    match table.get(name) {
        None => Ok(None),
        Some(Value::Table(t)) => Ok(Some(t)),
        Some(_) => Err(LinAlgError::ConfigFile(format!("'{}' must be a section", name))),
    }
}

fn as_str<'v>(key: &str, v: &'v Value) -> Result<&'v str, LinAlgError> {
    v.as_str()
        .ok_or_else(|| LinAlgError::ConfigFile(format!("{} must be a string", key)))
}

fn as_usize(key: &str, v: &Value) -> Result<usize, LinAlgError> {
    match v.as_integer() {
        Some(i) if i >= 0 => Ok(i as usize),
        _ => Err(LinAlgError::ConfigFile(format!(
            "{} must be a non-negative integer",
            key
        ))),
    }
}

fn read_usize(t: &Table, sec: &str, key: &str, out: &mut usize) -> Result<(), LinAlgError> {
    if let Some(v) = t.get(key) {
        *out = as_usize(&format!("{}.{}", sec, key), v)?;
    }
    Ok(())
}

/// Integers are accepted where a float is expected (`abs_tol = 0`).
fn read_f64(t: &Table, sec: &str, key: &str, out: &mut f64) -> Result<(), LinAlgError> {
    if let Some(v) = t.get(key) {
        *out = match v {
            Value::Float(f) => *f,
            Value::Integer(i) => *i as f64,
            _ => {
                return Err(LinAlgError::ConfigFile(format!(
                    "{}.{} must be a number",
                    sec, key
                )));
            }
        };
    }
    Ok(())
}

fn read_parsed<T: FromStr>(t: &Table, sec: &str, key: &str, out: &mut T) -> Result<(), LinAlgError> {
    if let Some(v) = t.get(key) {
        let name = as_str(key, v)?;
        *out = T::from_str(name).map_err(|_| {
            LinAlgError::ConfigFile(format!("unknown value '{}' for {}.{}", name, sec, key))
        })?;
    }
    Ok(())
}
