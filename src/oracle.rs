//! Satisfiability backends.
//!
//! The knowledge base only needs the SAT/UNSAT bit. Every backend is stateless
//! from the caller's point of view: the whole formula is handed over on each
//! call.

use crate::cnf::Formula;
use crate::error::{Error, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

pub trait Oracle {
    fn name(&self) -> &str;
    /// Whether `formula` has a model. `num_vars` is the declared variable count.
    fn solve(&mut self, formula: &Formula, num_vars: i32) -> Result<bool>;
}

/// An external DIMACS solver binary, called as `path args... file.cnf`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SATSolver {
    pub path: String,
    pub args: Vec<String>,
}

pub struct ExternalOracle {
    solver: SATSolver,
}

impl ExternalOracle {
    pub fn new(solver: SATSolver) -> Self {
        Self { solver }
    }
}

impl Oracle for ExternalOracle {
    fn name(&self) -> &str {
        &self.solver.path
    }

    fn solve(&mut self, formula: &Formula, num_vars: i32) -> Result<bool> {
        let mut file = tempfile::Builder::new()
            .prefix("hitman-")
            .suffix(".cnf")
            .tempfile()?;
        formula.write_dimacs(&mut file, num_vars)?;
        file.flush()?;
        let output = Command::new(&self.solver.path)
            .args(&self.solver.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|source| Error::OracleUnavailable {
                path: self.solver.path.clone(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let sat = parse_solver_output(&stdout, output.status.code())?;
        debug!(clauses = formula.len(), sat, "external solver answered");
        Ok(sat)
    }
}

/// Reads the status line of a SAT competition style solver. Falls back to the
/// conventional exit codes (10 = SAT, 20 = UNSAT).
pub fn parse_solver_output(stdout: &str, code: Option<i32>) -> Result<bool> {
    for line in stdout.lines() {
        match line.trim() {
            "s SATISFIABLE" | "SATISFIABLE" | "SAT" => return Ok(true),
            "s UNSATISFIABLE" | "UNSATISFIABLE" | "UNSAT" => return Ok(false),
            _ => {}
        }
    }
    match code {
        Some(10) => Ok(true),
        Some(20) => Ok(false),
        _ => {
            let head = stdout.lines().take(3).collect::<Vec<_>>().join(" | ");
            Err(Error::MalformedOracleOutput(format!(
                "exit code {:?}, output: {}",
                code, head
            )))
        }
    }
}

/// CaDiCaL linked in-process.
#[derive(Default)]
pub struct CadicalOracle;

impl Oracle for CadicalOracle {
    fn name(&self) -> &str {
        "cadical"
    }

    fn solve(&mut self, formula: &Formula, _num_vars: i32) -> Result<bool> {
        if formula.clauses().iter().any(|c| c.is_empty()) {
            return Ok(false);
        }
        let mut sat: cadical::Solver = Default::default();
        for clause in formula.clauses() {
            sat.add_clause(clause.iter().copied());
        }
        sat.solve()
            .ok_or_else(|| Error::Oracle("cadical returned no answer".to_owned()))
    }
}

/// MiniSat through rustsat.
#[derive(Default)]
pub struct MinisatOracle;

fn to_rustsat(l: i32) -> rustsat::types::Lit {
    let idx = (l.unsigned_abs() - 1) as u32;
    if l > 0 {
        rustsat::types::Lit::positive(idx)
    } else {
        rustsat::types::Lit::negative(idx)
    }
}

impl Oracle for MinisatOracle {
    fn name(&self) -> &str {
        "minisat"
    }

    fn solve(&mut self, formula: &Formula, _num_vars: i32) -> Result<bool> {
        use rustsat::instances::SatInstance;
        use rustsat::solvers::{Solve, SolverResult};

        if formula.clauses().iter().any(|c| c.is_empty()) {
            return Ok(false);
        }
        let mut inst: SatInstance = SatInstance::new();
        for clause in formula.clauses() {
            inst.add_clause(
                clause
                    .iter()
                    .map(|&l| to_rustsat(l))
                    .collect::<rustsat::types::Clause>(),
            );
        }
        let mut solver = rustsat_minisat::core::Minisat::default();
        solver
            .add_cnf(inst.into_cnf().0)
            .map_err(|e| Error::Oracle(e.to_string()))?;
        match solver.solve().map_err(|e| Error::Oracle(e.to_string()))? {
            SolverResult::Sat => Ok(true),
            SolverResult::Unsat => Ok(false),
            other => Err(Error::Oracle(format!("minisat: {:?}", other))),
        }
    }
}

/// Which backend to build, as chosen on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OracleKind {
    External(SATSolver),
    Cadical,
    Minisat,
}

impl OracleKind {
    pub fn build(&self) -> Box<dyn Oracle> {
        match self {
            OracleKind::External(solver) => Box::new(ExternalOracle::new(solver.clone())),
            OracleKind::Cadical => Box::new(CadicalOracle),
            OracleKind::Minisat => Box::new(MinisatOracle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> (Formula, Formula) {
        let mut sat = Formula::new();
        sat.add(vec![1, 2]);
        sat.add(vec![-1]);
        let mut unsat = sat.clone();
        unsat.add(vec![-2]);
        (sat, unsat)
    }

    #[test]
    fn parses_status_lines() {
        assert!(parse_solver_output("c comment\ns SATISFIABLE\nv 1 -2 0\n", Some(10)).unwrap());
        assert!(!parse_solver_output("c x\ns UNSATISFIABLE\n", Some(20)).unwrap());
        assert!(!parse_solver_output("", Some(20)).unwrap());
        assert!(matches!(
            parse_solver_output("garbage", Some(1)),
            Err(Error::MalformedOracleOutput(_))
        ));
    }

    #[test]
    fn in_process_backends_agree() {
        let (sat, unsat) = small();
        for kind in [OracleKind::Cadical, OracleKind::Minisat] {
            let mut oracle = kind.build();
            assert!(oracle.solve(&sat, 2).unwrap(), "{}", oracle.name());
            assert!(!oracle.solve(&unsat, 2).unwrap(), "{}", oracle.name());
        }
        let mut empty = Formula::new();
        empty.add(vec![]);
        assert!(!CadicalOracle.solve(&empty, 0).unwrap());
    }

    #[test]
    fn missing_solver_is_fatal() {
        let (sat, _) = small();
        let mut oracle = ExternalOracle::new(SATSolver {
            path: "/nonexistent/hitman-solver".to_owned(),
            args: vec![],
        });
        assert!(matches!(
            oracle.solve(&sat, 2),
            Err(Error::OracleUnavailable { .. })
        ));
    }
}
