use crate::encoder::DEFAULT_NAIVE_CLAUSE_LIMIT;
use crate::oracle::{OracleKind, SATSolver};
use clap::{Args, ValueEnum};

/// Default external solver when `--solver` is not given.
pub const SOLVER_ENV: &str = "HITMAN_SOLVER";

/// How the agent reasons and which oracle answers its questions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    pub use_sat: bool,
    pub oracle: OracleKind,
    pub lookahead_sat: bool,
    pub naive_clause_limit: u128,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            use_sat: false,
            oracle: OracleKind::Cadical,
            lookahead_sat: true,
            naive_clause_limit: DEFAULT_NAIVE_CLAUSE_LIMIT,
        }
    }
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    #[default]
    Cadical,
    Minisat,
}

/// Agent flags shared by the binaries.
#[derive(Args, Clone, Debug)]
pub struct AgentArgs {
    /// Reason with the SAT knowledge base.
    #[clap(long, default_value_t = false)]
    pub sat: bool,
    /// External DIMACS solver binary. Defaults to $HITMAN_SOLVER; without
    /// either, an in-process backend is used.
    #[clap(long)]
    pub solver: Option<String>,
    /// Extra argument for the external solver, repeatable.
    #[clap(long = "solver-arg", allow_hyphen_values = true)]
    pub solver_args: Vec<String>,
    /// In-process backend.
    #[clap(long, value_enum, default_value_t = Backend::Cadical)]
    pub backend: Backend,
    /// Do not probe the next step for guards proven by hearing.
    #[clap(long, default_value_t = false)]
    pub no_lookahead_sat: bool,
    /// Above this many clauses, cardinality constraints use a sequential counter.
    #[clap(long, default_value_t = DEFAULT_NAIVE_CLAUSE_LIMIT)]
    pub naive_clause_limit: u128,
}

impl AgentArgs {
    pub fn to_config(&self) -> AgentConfig {
        self.to_config_with(std::env::var(SOLVER_ENV).ok())
    }

    /// `env_solver` stands in for the environment variable.
    pub fn to_config_with(&self, env_solver: Option<String>) -> AgentConfig {
        let solver = self
            .solver
            .clone()
            .or(env_solver)
            .filter(|s| !s.is_empty());
        let oracle = match solver {
            Some(path) => OracleKind::External(SATSolver {
                path,
                args: self.solver_args.clone(),
            }),
            None => match self.backend {
                Backend::Cadical => OracleKind::Cadical,
                Backend::Minisat => OracleKind::Minisat,
            },
        };
        AgentConfig {
            use_sat: self.sat,
            oracle,
            lookahead_sat: !self.no_lookahead_sat,
            naive_clause_limit: self.naive_clause_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[clap(flatten)]
        agent: AgentArgs,
    }

    fn parse(args: &[&str]) -> AgentArgs {
        Cli::parse_from(std::iter::once("hitman").chain(args.iter().copied())).agent
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).to_config_with(None);
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn external_solver_from_flag_or_env() {
        let args = parse(&["--sat", "--solver", "kissat", "--solver-arg", "-q", "--no-lookahead-sat"]);
        let config = args.to_config_with(Some("minisat".to_owned()));
        assert!(config.use_sat);
        assert!(!config.lookahead_sat);
        assert_eq!(
            config.oracle,
            OracleKind::External(SATSolver {
                path: "kissat".to_owned(),
                args: vec!["-q".to_owned()],
            })
        );

        let config = parse(&["--backend", "minisat"]).to_config_with(Some("cadical".to_owned()));
        assert!(matches!(config.oracle, OracleKind::External(s) if s.path == "cadical"));
        let config = parse(&["--backend", "minisat"]).to_config_with(Some(String::new()));
        assert_eq!(config.oracle, OracleKind::Minisat);
    }
}
