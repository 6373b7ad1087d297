//! Notation normalization for formula strings.
//!
//! Formulas arrive written in common mathematical notation (`math.sin(x)`,
//! `asin(x)`, `x and y`) while each evaluation backend accepts its own token
//! vocabulary. A [`NotationTable`] maps source spellings onto one backend's
//! vocabulary and [`NotationTable::normalize`] applies it in a single
//! left-to-right scan.
//!
//! The scan consumes whole identifiers (including dotted qualifications) and
//! whole number literals, so a table key can never match inside a longer
//! identifier (`mysin(x)` stays `mysin(x)`) and a replacement can never be
//! re-matched by a later rule. Normalizing an already-normalized formula is
//! a no-op.

use std::collections::HashMap;

/// Canonical function vocabulary shared by all backends.
///
/// Every backend either supports these names natively or registers them as
/// custom functions, so the curated synonyms below always rewrite toward
/// this list.
pub const CANONICAL_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "sinh", "cosh", "tanh", "arcsin", "arccos", "arctan", "sqrt", "exp",
    "ln", "log10", "abs", "power", "min", "max", "floor", "ceil", "round", "if",
];

/// Hand-maintained synonym groups: canonical spelling and its alternates.
///
/// Versioned static data; adding a new notation equivalence is an addition
/// here, not a new code path.
const FUNCTION_SYNONYMS: &[(&str, &[&str])] = &[
    ("arcsin", &["asin"]),
    ("arccos", &["acos"]),
    ("arctan", &["atan"]),
    ("power", &["pow"]),
    ("ln", &["log"]),
];

/// Mapping from source token spellings to one backend's vocabulary.
#[derive(Debug, Clone, Default)]
pub struct NotationTable {
    /// Identifier -> replacement, applied only when the identifier is
    /// followed by `(`.
    functions: HashMap<String, String>,
    /// Standalone word -> replacement (boolean keyword operators). Never
    /// applied at call positions, where the word is a function name.
    keywords: HashMap<String, String>,
    /// Literal operator spellings, matched longest-first.
    operators: Vec<(&'static str, &'static str)>,
    /// Rewrite bare integer literals as float literals, for backends with
    /// strict integer/float typing.
    floatify_integers: bool,
}

impl NotationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table for a backend supporting the given canonical function
    /// names: each name passes through unchanged, its `math.`-qualified
    /// spelling is stripped, and curated synonyms rewrite to it.
    pub fn for_vocabulary(supported: &[&str]) -> Self {
        let mut table = Self::new();

        for &name in supported {
            table.map_function(name, name);
            table.map_function(&format!("math.{}", name), name);
        }

        for (canonical, synonyms) in FUNCTION_SYNONYMS {
            if !supported.contains(canonical) {
                continue;
            }
            for &synonym in *synonyms {
                table.map_function(synonym, canonical);
                table.map_function(&format!("math.{}", synonym), canonical);
            }
        }

        table
    }

    pub fn map_function(&mut self, source: &str, target: &str) {
        self.functions.insert(source.to_string(), target.to_string());
    }

    pub fn keyword(mut self, source: &str, target: &str) -> Self {
        self.keywords.insert(source.to_string(), target.to_string());
        self
    }

    pub fn operator(mut self, source: &'static str, target: &'static str) -> Self {
        self.operators.push((source, target));
        self.operators.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    pub fn floatify_integers(mut self) -> Self {
        self.floatify_integers = true;
        self
    }

    /// Rewrites a formula into this table's vocabulary.
    pub fn normalize(&self, formula: &str) -> String {
        let chars: Vec<char> = formula.chars().collect();
        let mut output = String::with_capacity(formula.len());
        let mut position = 0;

        while position < chars.len() {
            let ch = chars[position];

            if is_identifier_start(ch) {
                let (token, next) = read_identifier(&chars, position);
                position = next;

                if call_follows(&chars, position) {
                    match self.functions.get(&token) {
                        Some(replacement) => output.push_str(replacement),
                        None => output.push_str(&token),
                    }
                } else if let Some(replacement) = self.keywords.get(&token) {
                    output.push_str(replacement);
                } else {
                    output.push_str(&token);
                }
            } else if starts_number(&chars, position) {
                let (token, is_integer, next) = read_number(&chars, position);
                position = next;
                output.push_str(&token);
                if self.floatify_integers && is_integer {
                    output.push_str(".0");
                }
            } else if let Some((source, target)) = self.match_operator(&chars, position) {
                output.push_str(target);
                position += source.chars().count();
            } else {
                output.push(ch);
                position += 1;
            }
        }

        output
    }

    fn match_operator(&self, chars: &[char], position: usize) -> Option<(&'static str, &'static str)> {
        for &(source, target) in &self.operators {
            let len = source.chars().count();
            if position + len <= chars.len()
                && chars[position..position + len].iter().collect::<String>() == source
            {
                return Some((source, target));
            }
        }
        None
    }
}

/// Rewrites every free identifier in a formula through a caller-supplied
/// substitution, leaving function calls and everything else untouched.
///
/// Used by the evaluation engine to splice constant values into a formula
/// before it is handed to a backend. The callback receives each identifier
/// that is not followed by `(`; returning `None` leaves it in place.
pub fn substitute_identifiers<F>(formula: &str, mut substitute: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let chars: Vec<char> = formula.chars().collect();
    let mut output = String::with_capacity(formula.len());
    let mut position = 0;

    while position < chars.len() {
        let ch = chars[position];

        if is_identifier_start(ch) {
            let (token, next) = read_identifier(&chars, position);
            position = next;

            if !call_follows(&chars, position) {
                if let Some(replacement) = substitute(&token) {
                    output.push_str(&replacement);
                    continue;
                }
            }
            output.push_str(&token);
        } else if starts_number(&chars, position) {
            let (token, _, next) = read_number(&chars, position);
            position = next;
            output.push_str(&token);
        } else {
            output.push(ch);
            position += 1;
        }
    }

    output
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// A number literal starts with a digit or a leading-dot decimal (`.5`).
fn starts_number(chars: &[char], position: usize) -> bool {
    chars[position].is_ascii_digit()
        || (chars[position] == '.'
            && position + 1 < chars.len()
            && chars[position + 1].is_ascii_digit())
}

/// Reads a maximal identifier, including dotted qualifications such as
/// `math.sin` or `solar_panel.stc.irradiance`.
fn read_identifier(chars: &[char], start: usize) -> (String, usize) {
    let mut position = start;
    let mut token = String::new();

    while position < chars.len() {
        let ch = chars[position];
        if is_identifier_char(ch) {
            token.push(ch);
            position += 1;
        } else if ch == '.'
            && position + 1 < chars.len()
            && is_identifier_start(chars[position + 1])
        {
            token.push('.');
            position += 1;
        } else {
            break;
        }
    }

    (token, position)
}

/// Reads a maximal number literal: digits, optional fraction, optional
/// exponent. Returns the token, whether it is a bare integer, and the next
/// scan position.
fn read_number(chars: &[char], start: usize) -> (String, bool, usize) {
    let mut position = start;
    let mut token = String::new();
    let mut is_integer = true;

    while position < chars.len() && chars[position].is_ascii_digit() {
        token.push(chars[position]);
        position += 1;
    }

    if position + 1 < chars.len() && chars[position] == '.' && chars[position + 1].is_ascii_digit()
    {
        is_integer = false;
        token.push('.');
        position += 1;
        while position < chars.len() && chars[position].is_ascii_digit() {
            token.push(chars[position]);
            position += 1;
        }
    }

    if position < chars.len() && (chars[position] == 'e' || chars[position] == 'E') {
        let mut lookahead = position + 1;
        if lookahead < chars.len() && (chars[lookahead] == '+' || chars[lookahead] == '-') {
            lookahead += 1;
        }
        if lookahead < chars.len() && chars[lookahead].is_ascii_digit() {
            is_integer = false;
            while position < lookahead {
                token.push(chars[position]);
                position += 1;
            }
            while position < chars.len() && chars[position].is_ascii_digit() {
                token.push(chars[position]);
                position += 1;
            }
        }
    }

    (token, is_integer, position)
}

/// True when the next non-whitespace character opens a call.
fn call_follows(chars: &[char], mut position: usize) -> bool {
    while position < chars.len() && chars[position].is_whitespace() {
        position += 1;
    }
    position < chars.len() && chars[position] == '('
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback_table() -> NotationTable {
        NotationTable::for_vocabulary(CANONICAL_FUNCTIONS)
            .keyword("and", "&")
            .keyword("or", "|")
            .keyword("not", "~")
    }

    #[test]
    fn test_qualified_and_short_forms() {
        let table = fallback_table();

        assert_eq!(
            table.normalize("math.asin(x) + acos(y)"),
            "arcsin(x) + arccos(y)"
        );
        assert_eq!(table.normalize("math.sin(x)"), "sin(x)");
        assert_eq!(
            table.normalize("math.pow(x, 2) + pow(y, 3)"),
            "power(x, 2) + power(y, 3)"
        );
    }

    #[test]
    fn test_boolean_keywords() {
        let table = fallback_table();

        assert_eq!(table.normalize("x and y or not z"), "x & y | ~ z");
    }

    #[test]
    fn test_keyword_function_forms_pass_through() {
        let table = fallback_table();

        // A boolean word opening a call is a function name, not an operator.
        assert_eq!(
            table.normalize("and(x, y) or not (z)"),
            "and(x, y) | not (z)"
        );
        assert_eq!(table.normalize("not(0)"), "not(0)");
    }

    #[test]
    fn test_boundary_safety() {
        let table = fallback_table();

        // No parenthesis after the name: not a function call.
        assert_eq!(table.normalize("sinx + cosy"), "sinx + cosy");
        // Table keys inside longer identifiers never match.
        assert_eq!(
            table.normalize("mysin(x) + yourcos(y)"),
            "mysin(x) + yourcos(y)"
        );
        // A bare canonical name without a call stays a plain identifier.
        assert_eq!(table.normalize("sin + 1"), "sin + 1");
        // Keywords never match inside identifiers.
        assert_eq!(table.normalize("android * ornament"), "android * ornament");
    }

    #[test]
    fn test_idempotence() {
        let table = fallback_table();

        for formula in [
            "math.asin(x) + acos(y)",
            "x and y or not z",
            "sin(x) * sqrt(y) + 2.5e-3",
            "mysin(x) + 42",
        ] {
            let once = table.normalize(formula);
            let twice = table.normalize(&once);
            assert_eq!(once, twice, "normalization of '{}' is not idempotent", formula);
        }
    }

    #[test]
    fn test_operator_rewriting() {
        let table = NotationTable::for_vocabulary(CANONICAL_FUNCTIONS).operator("**", "^");

        assert_eq!(table.normalize("x ** 2 + y ^ 3"), "x ^ 2 + y ^ 3");
        // Idempotent because the target spelling is not a rule source.
        assert_eq!(table.normalize("x ^ 2 + y ^ 3"), "x ^ 2 + y ^ 3");
    }

    #[test]
    fn test_integer_floatification() {
        let table = NotationTable::for_vocabulary(CANONICAL_FUNCTIONS).floatify_integers();

        assert_eq!(table.normalize("x > 0"), "x > 0.0");
        assert_eq!(table.normalize("2 + 3.5"), "2.0 + 3.5");
        // Exponent and fractional literals are already floats.
        assert_eq!(table.normalize("1e-3 + 2.0"), "1e-3 + 2.0");
        // Digits inside identifiers are untouched.
        assert_eq!(table.normalize("x2 + 1"), "x2 + 1.0");
        // Leading-dot decimals are already floats.
        assert_eq!(table.normalize(".5 + 1"), ".5 + 1.0");
    }

    #[test]
    fn test_dotted_identifiers_left_alone() {
        let table = fallback_table();

        assert_eq!(
            table.normalize("solar_panel.stc.irradiance * x"),
            "solar_panel.stc.irradiance * x"
        );
        // Unknown qualification prefix never matches a math.* rule.
        assert_eq!(table.normalize("foo.math.sin(x)"), "foo.math.sin(x)");
    }

    #[test]
    fn test_substitute_identifiers() {
        let result = substitute_identifiers("rain_factor * sin(x) + x", |name| match name {
            "rain_factor" => Some("0.7".to_string()),
            _ => None,
        });
        assert_eq!(result, "0.7 * sin(x) + x");

        // Call positions are never substituted, even for matching names.
        let result = substitute_identifiers("sin(sin)", |name| match name {
            "sin" => Some("1.0".to_string()),
            _ => None,
        });
        assert_eq!(result, "sin(1.0)");
    }
}
