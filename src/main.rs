//! Thin CLI binary (§2a: "a thin binary, kept minimal, wires
//! `env_logger` at `main()`"). The DIMACS parser itself is an explicit
//! non-goal of the core, so the reader here stays a small private
//! function rather than a polished, independently tested module.

#[macro_use]
extern crate log;

use std::fs;
use std::io::{self, BufRead};
use std::process;

use cdcl_sim::formula::Lit;
use cdcl_sim::settings::Settings;
use cdcl_sim::solver::{SolveOutcome, Solver};

fn main() {
    env_logger::init();

    let path = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: cdcl-sim <dimacs-file>");
            process::exit(2);
        }
    };

    let file = match fs::File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            error!("could not open {}: {}", path, e);
            process::exit(2);
        }
    };

    let mut solver = Solver::new(Settings::default());
    if let Err(e) = read_dimacs(io::BufReader::new(file), &mut solver) {
        error!("DIMACS parse error: {}", e);
        process::exit(2);
    }

    info!("|  Number of variables:  {:12}                                         |", solver.num_vars());

    let outcome = match solver.solve() {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("solver error: {}", e);
            process::exit(1);
        }
    };

    match outcome {
        SolveOutcome::Sat => {
            println!("SAT");
            let model = solver.model();
            for (i, &val) in model.iter().enumerate() {
                print!("{} ", if val { (i + 1) as i64 } else { -((i + 1) as i64) });
            }
            println!("0");
        }
        SolveOutcome::Unsat => println!("UNSAT"),
        SolveOutcome::Unknown => println!("UNKNOWN"),
    }

    let stats = solver.stats();
    info!("restarts              : {:<12}", stats.restarts);
    info!("conflicts              : {:<12}", stats.conflicts);
    info!("decisions              : {:<12}", stats.decisions);
    info!("propagations           : {:<12}", stats.propagations);
}

/// Reads `p cnf V C`, `c` comments, and whitespace/newline-separated
/// zero-terminated clauses, creating variables as their DIMACS indices
/// are first seen. Every clause is fed through `solver.add_clause`
/// rather than discarded on failure, since an allocator-exhaustion error
/// there silently under-constrains the formula if ignored.
fn read_dimacs<R: BufRead>(reader: R, solver: &mut Solver) -> cdcl_sim::Result<()> {
    let mut vars: Vec<cdcl_sim::formula::Var> = Vec::new();
    let mut clause: Vec<Lit> = Vec::new();
    let mut header_seen = false;

    for line in reader.lines() {
        let line = line.map_err(|e| cdcl_sim::SimError::DimacsParse(e.to_string()))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        if line.starts_with("p cnf") {
            header_seen = true;
            continue;
        }
        if !header_seen {
            return Err(cdcl_sim::SimError::DimacsParse("missing 'p cnf' header".to_string()));
        }
        for tok in line.split_whitespace() {
            let n: i64 = tok
                .parse()
                .map_err(|_| cdcl_sim::SimError::DimacsParse(format!("not an integer: {}", tok)))?;
            if n == 0 {
                solver.add_clause(&clause)?;
                clause.clear();
                continue;
            }
            let idx = (n.abs() as usize) - 1;
            while vars.len() <= idx {
                vars.push(solver.new_var());
            }
            clause.push(vars[idx].lit(n < 0));
        }
    }

    Ok(())
}
