//! JSON problem input.
//!
//! A small serde schema mirroring the builder API: variables by name,
//! linear/quadratic/monomial/signomial term lists, and nonlinear
//! expressions in parenthesized prefix form, e.g.
//! `(+ (^ x 2) (exp y) -1.5)`. This stands in for the algebraic file
//! formats, whose parsers are external to the engine.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use shale_core::{
    Constraint, Expression, LinearTerm, MonomialTerm, Objective, ObjectiveSense, Problem,
    QuadraticTerm, SignomialElement, SignomialTerm, VariableType,
};

#[derive(Debug, Deserialize)]
pub struct ProblemFile {
    pub name: Option<String>,
    pub variables: Vec<VariableEntry>,
    #[serde(default)]
    pub constraints: Vec<ConstraintEntry>,
    pub objective: ObjectiveEntry,
}

#[derive(Debug, Deserialize)]
pub struct VariableEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct LinearEntry {
    pub coefficient: f64,
    pub variable: String,
}

#[derive(Debug, Deserialize)]
pub struct QuadraticEntry {
    pub coefficient: f64,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Deserialize)]
pub struct MonomialEntry {
    pub coefficient: f64,
    pub variables: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignomialEntry {
    pub coefficient: f64,
    pub elements: Vec<(String, f64)>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConstraintEntry {
    pub name: Option<String>,
    pub lhs: Option<f64>,
    pub rhs: Option<f64>,
    #[serde(default)]
    pub constant: f64,
    #[serde(default)]
    pub linear: Vec<LinearEntry>,
    #[serde(default)]
    pub quadratic: Vec<QuadraticEntry>,
    #[serde(default)]
    pub monomials: Vec<MonomialEntry>,
    #[serde(default)]
    pub signomials: Vec<SignomialEntry>,
    pub expression: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectiveEntry {
    pub sense: ObjectiveSense,
    #[serde(default)]
    pub constant: f64,
    #[serde(default)]
    pub linear: Vec<LinearEntry>,
    #[serde(default)]
    pub quadratic: Vec<QuadraticEntry>,
    #[serde(default)]
    pub monomials: Vec<MonomialEntry>,
    #[serde(default)]
    pub signomials: Vec<SignomialEntry>,
    pub expression: Option<String>,
}

/// Build a finalized [`Problem`] from the parsed file.
pub fn build_problem(file: &ProblemFile) -> Result<Problem> {
    let mut problem = Problem::new(file.name.clone().unwrap_or_else(|| "problem".into()));
    let mut index: HashMap<&str, usize> = HashMap::new();

    for v in &file.variables {
        let idx = problem.add_variable(
            v.name.clone(),
            v.var_type,
            v.lower.unwrap_or(f64::NEG_INFINITY),
            v.upper.unwrap_or(f64::INFINITY),
        )?;
        if index.insert(v.name.as_str(), idx).is_some() {
            bail!("duplicate variable name '{}'", v.name);
        }
    }

    let lookup = |name: &str| -> Result<usize> {
        index
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("undeclared variable '{}'", name))
    };

    for (k, c) in file.constraints.iter().enumerate() {
        let name = c.name.clone().unwrap_or_else(|| format!("c{}", k));
        let mut constraint = Constraint::new(
            0,
            name.clone(),
            c.lhs.unwrap_or(f64::NEG_INFINITY),
            c.rhs.unwrap_or(f64::INFINITY),
        );
        constraint.constant = c.constant;
        for t in &c.linear {
            constraint
                .linear_terms
                .push(LinearTerm::new(t.coefficient, lookup(&t.variable)?));
        }
        for t in &c.quadratic {
            constraint.quadratic_terms.push(QuadraticTerm::new(
                t.coefficient,
                lookup(&t.first)?,
                lookup(&t.second)?,
            ));
        }
        for t in &c.monomials {
            let vars = t
                .variables
                .iter()
                .map(|v| lookup(v))
                .collect::<Result<Vec<_>>>()?;
            constraint
                .monomial_terms
                .push(MonomialTerm::new(t.coefficient, vars));
        }
        for t in &c.signomials {
            let elements = t
                .elements
                .iter()
                .map(|(v, p)| Ok(SignomialElement::new(lookup(v)?, *p)))
                .collect::<Result<Vec<_>>>()?;
            constraint
                .signomial_terms
                .push(SignomialTerm::new(t.coefficient, elements));
        }
        if let Some(text) = &c.expression {
            let expr = parse_expression(text, &index)
                .with_context(|| format!("in constraint '{}'", name))?;
            constraint.expression = Some(std::sync::Arc::new(expr));
        }
        problem.add_constraint(constraint)?;
    }

    let mut objective = Objective::new(file.objective.sense);
    objective.constant = file.objective.constant;
    for t in &file.objective.linear {
        objective
            .linear_terms
            .push(LinearTerm::new(t.coefficient, lookup(&t.variable)?));
    }
    for t in &file.objective.quadratic {
        objective.quadratic_terms.push(QuadraticTerm::new(
            t.coefficient,
            lookup(&t.first)?,
            lookup(&t.second)?,
        ));
    }
    for t in &file.objective.monomials {
        let vars = t
            .variables
            .iter()
            .map(|v| lookup(v))
            .collect::<Result<Vec<_>>>()?;
        objective
            .monomial_terms
            .push(MonomialTerm::new(t.coefficient, vars));
    }
    for t in &file.objective.signomials {
        let elements = t
            .elements
            .iter()
            .map(|(v, p)| Ok(SignomialElement::new(lookup(v)?, *p)))
            .collect::<Result<Vec<_>>>()?;
        objective
            .signomial_terms
            .push(SignomialTerm::new(t.coefficient, elements));
    }
    if let Some(text) = &file.objective.expression {
        let expr = parse_expression(text, &index).context("in the objective")?;
        objective.expression = Some(std::sync::Arc::new(expr));
    }
    problem.set_objective(objective);

    problem.finalize()?;
    Ok(problem)
}

/// Parse a parenthesized prefix expression.
///
/// Grammar: atom = number | variable; list = `(op arg...)` with op in
/// `+ - * / ^ exp log sqrt abs sin cos neg`.
pub fn parse_expression(text: &str, variables: &HashMap<&str, usize>) -> Result<Expression> {
    let tokens = tokenize(text);
    let mut pos = 0;
    let expr = parse_tokens(&tokens, &mut pos, variables)?;
    if pos != tokens.len() {
        bail!("trailing tokens after expression");
    }
    Ok(expr)
}

fn tokenize(text: &str) -> Vec<String> {
    text.replace('(', " ( ")
        .replace(')', " ) ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn parse_tokens(
    tokens: &[String],
    pos: &mut usize,
    variables: &HashMap<&str, usize>,
) -> Result<Expression> {
    let Some(token) = tokens.get(*pos) else {
        bail!("unexpected end of expression");
    };
    *pos += 1;

    if token != "(" {
        if let Ok(value) = token.parse::<f64>() {
            return Ok(Expression::constant(value));
        }
        return variables
            .get(token.as_str())
            .map(|&i| Expression::variable(i))
            .ok_or_else(|| anyhow!("unknown symbol '{}'", token));
    }

    let Some(op) = tokens.get(*pos) else {
        bail!("missing operator after '('");
    };
    let op = op.clone();
    *pos += 1;

    let mut args = Vec::new();
    while tokens.get(*pos).map(String::as_str) != Some(")") {
        if tokens.get(*pos).is_none() {
            bail!("missing ')'");
        }
        args.push(parse_tokens(tokens, pos, variables)?);
    }
    *pos += 1; // consume ')'

    let unary = |mut args: Vec<Expression>, op: &str| -> Result<Expression> {
        if args.len() != 1 {
            bail!("operator '{}' takes exactly one argument", op);
        }
        Ok(args.remove(0))
    };
    let binary = |mut args: Vec<Expression>, op: &str| -> Result<(Expression, Expression)> {
        if args.len() != 2 {
            bail!("operator '{}' takes exactly two arguments", op);
        }
        let b = args.remove(1);
        let a = args.remove(0);
        Ok((a, b))
    };

    match op.as_str() {
        "+" => Ok(Expression::sum(args)),
        "-" => match args.len() {
            1 => Ok(Expression::negate(unary(args, "-")?)),
            2 => {
                let (a, b) = binary(args, "-")?;
                Ok(Expression::sum(vec![a, Expression::negate(b)]))
            }
            _ => bail!("operator '-' takes one or two arguments"),
        },
        "*" => Ok(Expression::product(args)),
        "/" => {
            let (a, b) = binary(args, "/")?;
            Ok(Expression::divide(a, b))
        }
        "^" => {
            let (a, b) = binary(args, "^")?;
            Ok(Expression::power(a, b))
        }
        "exp" => Ok(Expression::exp(unary(args, "exp")?)),
        "log" => Ok(Expression::log(unary(args, "log")?)),
        "sqrt" => Ok(Expression::sqrt(unary(args, "sqrt")?)),
        "abs" => Ok(Expression::abs(unary(args, "abs")?)),
        "sin" => Ok(Expression::sin(unary(args, "sin")?)),
        "cos" => Ok(Expression::cos(unary(args, "cos")?)),
        "neg" => Ok(Expression::negate(unary(args, "neg")?)),
        other => bail!("unknown operator '{}'", other),
    }
}
