//! solarmetrics - Metric Layer CLI
//!
//! Loads the constants and formulas documents, evaluates one formula
//! against `key=value` parameters from the command line, and prints the
//! scalar result.

use std::collections::HashMap;
use std::process;

use solarmetrics::application::MetricService;

/// Entry point for the metric layer command line tool.
///
/// Usage:
///
/// ```text
/// solarmetrics <constants.json> <formulas.json> <formula-or-name> [key=value ...]
/// ```
///
/// Configuration loads eagerly; any configuration or evaluation error is
/// printed and the process exits non-zero.
fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.len() < 3 {
        eprintln!("usage: solarmetrics <constants.json> <formulas.json> <formula-or-name> [key=value ...]");
        process::exit(2);
    }

    let constants_path = &args[0];
    let formulas_path = &args[1];
    let formula = &args[2];

    let params = match parse_params(&args[3..]) {
        Ok(params) => params,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(2);
        }
    };

    let service = match MetricService::from_files(constants_path, formulas_path) {
        Ok(service) => service,
        Err(error) => {
            eprintln!("{}", error);
            process::exit(1);
        }
    };

    match service.evaluate_formula(formula, &params) {
        Ok(result) => println!("{}", result),
        Err(error) => {
            eprintln!("{}", error);
            process::exit(1);
        }
    }
}

/// Parses trailing `key=value` arguments into a parameter binding.
fn parse_params(args: &[String]) -> Result<HashMap<String, f64>, String> {
    let mut params = HashMap::new();

    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("Invalid parameter '{}': expected key=value", arg))?;
        let value = value
            .parse::<f64>()
            .map_err(|_| format!("Invalid numeric value in '{}'", arg))?;
        params.insert(key.to_string(), value);
    }

    Ok(params)
}
