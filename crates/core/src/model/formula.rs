//! Regression formulas of the form `response ~ a + C(b) + a:C(b) + np.power(a, 2)`.
//!
//! Supported right-hand-side syntax:
//! - `x`             column as-is (numeric) or treatment-coded (factor column)
//! - `C(x)`          force categorical treatment coding
//! - `a:b`           interaction (elementwise product of the expanded columns)
//! - `a*b`           shorthand for `a + b + a:b`
//! - `power(x, k)`   `x` raised to the integer power `k` (`np.power` also accepted)
//! - `1`, `0`, `- 1` add or remove the intercept

use std::fmt;

use crate::error::{AnalysisError, Result};

/// One factor inside a formula term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorExpr {
    /// A bare column; its type in the data decides numeric vs categorical.
    Column(String),
    /// `C(column)`: always categorical.
    Categorical(String),
    /// `power(column, exponent)`, named exactly as `label`.
    Power {
        column: String,
        exponent: i32,
        label: String,
    },
}

impl FactorExpr {
    /// The data column this factor reads.
    pub fn column(&self) -> &str {
        match self {
            FactorExpr::Column(c) | FactorExpr::Categorical(c) => c,
            FactorExpr::Power { column, .. } => column,
        }
    }

    /// Prefix used in coefficient names.
    pub fn label(&self) -> String {
        match self {
            FactorExpr::Column(c) => c.clone(),
            FactorExpr::Categorical(c) => format!("C({})", c),
            FactorExpr::Power { label, .. } => label.clone(),
        }
    }
}

/// A product of one or more factors. The empty product is never stored;
/// the intercept is tracked on [`Formula`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub factors: Vec<FactorExpr>,
}

impl Term {
    fn key(&self) -> Vec<String> {
        let mut k: Vec<String> = self.factors.iter().map(|f| f.label()).collect();
        k.sort();
        k
    }

    /// Interaction order (number of factors).
    pub fn order(&self) -> usize {
        self.factors.len()
    }

    fn combine(&self, other: &Term) -> Term {
        let mut factors = self.factors.clone();
        for f in &other.factors {
            if !factors.contains(f) {
                factors.push(f.clone());
            }
        }
        Term { factors }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.factors.iter().map(|x| x.label()).collect();
        write!(f, "{}", labels.join(":"))
    }
}

/// A parsed model formula.
#[derive(Debug, Clone)]
pub struct Formula {
    text: String,
    pub response: String,
    pub intercept: bool,
    /// Terms ordered by interaction order, ties by first appearance.
    pub terms: Vec<Term>,
}

impl Formula {
    /// Parse a formula string.
    ///
    /// # Errors
    /// Returns [`AnalysisError::Formula`] for a missing `~`, an empty side,
    /// unbalanced parentheses or unsupported syntax.
    pub fn parse(text: &str) -> Result<Self> {
        let (lhs, rhs) = text
            .split_once('~')
            .ok_or_else(|| AnalysisError::Formula(format!("missing '~' in '{}'", text)))?;

        let response = lhs.trim();
        if response.is_empty() {
            return Err(AnalysisError::Formula(format!(
                "missing response variable in '{}'",
                text
            )));
        }
        if rhs.contains('~') {
            return Err(AnalysisError::Formula(format!("more than one '~' in '{}'", text)));
        }

        let mut intercept = true;
        let mut terms: Vec<Term> = Vec::new();

        for (negated, piece) in split_top_level(rhs, &['+', '-'])? {
            let piece = piece.trim();
            if piece.is_empty() {
                if negated {
                    return Err(AnalysisError::Formula(format!("dangling '-' in '{}'", text)));
                }
                continue;
            }
            match (negated, piece) {
                (false, "1") => intercept = true,
                (false, "0") | (true, "1") => intercept = false,
                (true, other) => {
                    return Err(AnalysisError::Formula(format!(
                        "only the intercept can be removed, found '- {}'",
                        other
                    )))
                }
                (false, product) => {
                    for term in parse_product(product)? {
                        if !terms.iter().any(|t| t.key() == term.key()) {
                            terms.push(term);
                        }
                    }
                }
            }
        }

        if terms.is_empty() && !intercept {
            return Err(AnalysisError::Formula(format!(
                "formula '{}' has no terms",
                text
            )));
        }

        terms.sort_by_key(|t| t.order());

        Ok(Formula {
            text: text.trim().to_string(),
            response: response.to_string(),
            intercept,
            terms,
        })
    }

    /// Every data column the formula reads, response first, without duplicates.
    pub fn columns(&self) -> Vec<&str> {
        let mut cols = vec![self.response.as_str()];
        for term in &self.terms {
            for f in &term.factors {
                if !cols.contains(&f.column()) {
                    cols.push(f.column());
                }
            }
        }
        cols
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Split on top-level separators, returning `(preceded_by_minus, piece)`.
fn split_top_level(s: &str, seps: &[char]) -> Result<Vec<(bool, String)>> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut negated = false;

    for ch in s.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(AnalysisError::Formula(format!("unbalanced ')' in '{}'", s)));
                }
                current.push(ch);
            }
            c if depth == 0 && seps.contains(&c) => {
                pieces.push((negated, std::mem::take(&mut current)));
                negated = c == '-';
            }
            c => current.push(c),
        }
    }
    if depth != 0 {
        return Err(AnalysisError::Formula(format!("unbalanced '(' in '{}'", s)));
    }
    pieces.push((negated, current));
    Ok(pieces)
}

/// `a*b:c` -> all terms of the crossing.
fn parse_product(piece: &str) -> Result<Vec<Term>> {
    let mut acc: Vec<Term> = Vec::new();
    for (_, part) in split_top_level(piece, &['*'])? {
        let mut factors = Vec::new();
        for (_, f) in split_top_level(&part, &[':'])? {
            let factor = parse_factor(f.trim())?;
            if !factors.contains(&factor) {
                factors.push(factor);
            }
        }
        let term = Term { factors };

        let mut next = acc.clone();
        next.push(term.clone());
        for existing in &acc {
            next.push(existing.combine(&term));
        }
        acc = next;
    }
    Ok(acc)
}

fn parse_factor(s: &str) -> Result<FactorExpr> {
    if s.is_empty() {
        return Err(AnalysisError::Formula("empty factor in term".into()));
    }

    if let Some(inner) = s.strip_prefix("C(").and_then(|r| r.strip_suffix(')')) {
        let column = inner.trim();
        if column.is_empty() || column.contains(',') || column.contains('(') {
            return Err(AnalysisError::Formula(format!(
                "only C(column) is supported, found '{}'",
                s
            )));
        }
        return Ok(FactorExpr::Categorical(column.to_string()));
    }

    for prefix in ["np.power(", "power("] {
        if let Some(inner) = s.strip_prefix(prefix).and_then(|r| r.strip_suffix(')')) {
            let (column, exponent) = inner.split_once(',').ok_or_else(|| {
                AnalysisError::Formula(format!("power() needs two arguments in '{}'", s))
            })?;
            let column = column.trim();
            let exponent: i32 = exponent.trim().parse().map_err(|_| {
                AnalysisError::Formula(format!("power() exponent must be an integer in '{}'", s))
            })?;
            return Ok(FactorExpr::Power {
                column: column.to_string(),
                exponent,
                label: format!("{}{}, {})", prefix, column, exponent),
            });
        }
    }

    if s.contains('(') || s.contains(')') || s.contains(char::is_whitespace) {
        return Err(AnalysisError::Formula(format!("unsupported expression '{}'", s)));
    }
    Ok(FactorExpr::Column(s.to_string()))
}
