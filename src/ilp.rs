//! Collapse selection as a 0/1 integer program.
//!
//! The driver scores candidate collapses and must pick a maximum-weight set
//! of pairwise-disjoint ones. That is a 0/1 program — maximize `Σ w_i X_i`
//! subject to one `Σ X ≤ 1` row per shared network node — solved either by
//! an external ILP executable or by a built-in greedy heuristic. The
//! external solver is never a hard dependency: any failure (missing binary,
//! unparseable output, infeasibility) falls back to the heuristic.

use std::path::PathBuf;
use std::process::Command;

use log::{debug, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("ILP solver unavailable: {0}")]
    Unavailable(String),
    #[error("no feasible solution")]
    Infeasible,
    #[error("unparseable solver output: {0}")]
    BadOutput(String),
    #[error("i/o failure talking to the solver: {0}")]
    Io(#[from] std::io::Error),
}

/// Maximize `Σ weights[i] * X_i` over 0/1 variables subject to
/// `Σ_{i in row} X_i <= 1` for every constraint row.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    pub weights: Vec<f64>,
    pub constraints: Vec<Vec<usize>>,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub objective: f64,
    pub chosen: Vec<bool>,
}

pub trait CollapseSolver {
    fn solve(&self, problem: &Problem) -> Result<Solution, SolverError>;
}

/// Weight-sorted greedy selection: always feasible, never fails.
pub struct GreedySolver;

impl CollapseSolver for GreedySolver {
    fn solve(&self, problem: &Problem) -> Result<Solution, SolverError> {
        let n = problem.weights.len();
        let mut rows_of = vec![Vec::new(); n];
        for (row, members) in problem.constraints.iter().enumerate() {
            for &var in members {
                rows_of[var].push(row);
            }
        }

        let mut order: Vec<usize> = (0..n).filter(|&i| problem.weights[i] > 0.0).collect();
        order.sort_by(|&a, &b| {
            problem.weights[b].partial_cmp(&problem.weights[a]).unwrap().then(a.cmp(&b))
        });

        let mut row_taken = vec![false; problem.constraints.len()];
        let mut chosen = vec![false; n];
        let mut objective = 0.0;
        for var in order {
            if rows_of[var].iter().any(|&row| row_taken[row]) {
                continue;
            }
            chosen[var] = true;
            objective += problem.weights[var];
            for &row in &rows_of[var] {
                row_taken[row] = true;
            }
        }
        debug!("greedy selection: objective {:.3}", objective);
        Ok(Solution { objective, chosen })
    }
}

/// Invokes an external ILP executable on an lp-style problem file.
pub struct ExternalIlp {
    pub program: PathBuf,
}

impl ExternalIlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn render(problem: &Problem) -> String {
        let mut text = String::from("max:");
        for (i, w) in problem.weights.iter().enumerate() {
            if i > 0 {
                text.push_str(" +");
            }
            text.push_str(&format!(" {} X{}", w, i));
        }
        text.push_str(";\n");
        for row in &problem.constraints {
            let members: Vec<String> = row.iter().map(|v| format!("X{}", v)).collect();
            text.push_str(&format!("{} <= 1;\n", members.join(" + ")));
        }
        let vars: Vec<String> = (0..problem.weights.len()).map(|i| format!("X{}", i)).collect();
        text.push_str(&format!("int {};\n", vars.join(" ")));
        text
    }

    fn parse_output(text: &str, num_vars: usize) -> Result<Solution, SolverError> {
        let lower = text.to_lowercase();
        if lower.contains("infeasible") || lower.contains("no feasible solution") {
            return Err(SolverError::Infeasible);
        }

        let mut objective = None;
        let mut chosen = vec![false; num_vars];
        for line in text.lines() {
            let line = line.trim();
            if objective.is_none() && line.to_lowercase().contains("objective") {
                if let Some(value) =
                    line.split_whitespace().rev().find_map(|t| t.parse::<f64>().ok())
                {
                    objective = Some(value);
                }
                continue;
            }
            let mut tokens = line.split_whitespace();
            if let (Some(name), Some(value)) = (tokens.next(), tokens.next()) {
                if let Some(index) = name.strip_prefix('X').and_then(|s| s.parse::<usize>().ok())
                {
                    let value: f64 = value
                        .parse()
                        .map_err(|_| SolverError::BadOutput(line.to_string()))?;
                    if index < num_vars {
                        chosen[index] = value > 0.5;
                    }
                }
            }
        }
        match objective {
            Some(objective) => Ok(Solution { objective, chosen }),
            None => Err(SolverError::BadOutput("missing objective line".to_string())),
        }
    }
}

impl CollapseSolver for ExternalIlp {
    fn solve(&self, problem: &Problem) -> Result<Solution, SolverError> {
        let input = Self::render(problem);
        let path =
            std::env::temp_dir().join(format!("act-map-collapse-{}.lp", std::process::id()));
        std::fs::write(&path, input)?;

        let output = Command::new(&self.program).arg(&path).output();
        let _ = std::fs::remove_file(&path);
        let output = output.map_err(|e| {
            SolverError::Unavailable(format!("{}: {}", self.program.display(), e))
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_output(&stdout, problem.weights.len())
    }
}

/// Solve exactly when an external solver is configured and answers; fall
/// back to the greedy heuristic on any solver error.
pub fn solve_with_fallback(external: Option<&ExternalIlp>, problem: &Problem) -> Solution {
    if let Some(solver) = external {
        match solver.solve(problem) {
            Ok(solution) => return solution,
            Err(e) => warn!("external ILP failed ({}); using greedy fallback", e),
        }
    }
    GreedySolver
        .solve(problem)
        .expect("greedy selection cannot fail")
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_greedy_respects_conflicts() {
        // X1 is heaviest; X0 and X2 conflict with it pairwise.
        let problem = Problem {
            weights: vec![2.0, 3.0, 2.5],
            constraints: vec![vec![0, 1], vec![1, 2]],
        };
        let solution = GreedySolver.solve(&problem).unwrap();
        assert_eq!(solution.chosen, vec![false, true, false]);
        assert!((solution.objective - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_greedy_takes_compatible_pair() {
        let problem = Problem {
            weights: vec![2.0, 1.5, 2.5],
            constraints: vec![vec![0, 2]],
        };
        let solution = GreedySolver.solve(&problem).unwrap();
        // X2 wins its row over X0; X1 is unconstrained.
        assert_eq!(solution.chosen, vec![false, true, true]);
    }

    #[test]
    fn test_greedy_skips_nonpositive_weights() {
        let problem = Problem { weights: vec![-1.0, 0.0], constraints: vec![] };
        let solution = GreedySolver.solve(&problem).unwrap();
        assert_eq!(solution.chosen, vec![false, false]);
        assert_eq!(solution.objective, 0.0);
    }

    #[test]
    fn test_render_format() {
        let problem = Problem {
            weights: vec![2.0, 3.5],
            constraints: vec![vec![0, 1]],
        };
        let text = ExternalIlp::render(&problem);
        assert!(text.starts_with("max: 2 X0 + 3.5 X1;"));
        assert!(text.contains("X0 + X1 <= 1;"));
        assert!(text.contains("int X0 X1;"));
    }

    #[test]
    fn test_parse_output() {
        let out = "Value of objective function: 5.5\n\nActual values of the variables:\nX0 1\nX1 0\nX2 1\n";
        let solution = ExternalIlp::parse_output(out, 3).unwrap();
        assert!((solution.objective - 5.5).abs() < 1e-9);
        assert_eq!(solution.chosen, vec![true, false, true]);
    }

    #[test]
    fn test_parse_infeasible() {
        let out = "This problem is infeasible\n";
        assert!(matches!(
            ExternalIlp::parse_output(out, 2),
            Err(SolverError::Infeasible)
        ));
    }

    #[test]
    fn test_missing_binary_falls_back() {
        let external = ExternalIlp::new("/nonexistent/act-map-test-solver");
        let problem = Problem {
            weights: vec![1.0, 4.0],
            constraints: vec![vec![0, 1]],
        };
        let solution = solve_with_fallback(Some(&external), &problem);
        assert_eq!(solution.chosen, vec![false, true]);
    }
}
