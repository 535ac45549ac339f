//! Readers for the DIMACS CNF and DIMACS graph (`.col`) formats.

use std::io::{self, BufRead, BufReader, Read};

use log::{debug, warn};
use thiserror::Error;

use crate::encode::{Cnf, Graph};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no problem line (`p {0} ...`) found")]
    MissingHeader(&'static str),

    #[error("line {line}: invalid problem line `{content}`")]
    InvalidHeader { line: usize, content: String },

    #[error("line {line}: invalid token `{token}`")]
    InvalidToken { line: usize, token: String },

    #[error("line {line}: literal {literal} is outside of 1..={num_vars}")]
    LiteralOutOfRange { line: usize, literal: i32, num_vars: usize },

    #[error("line {line}: vertex {vertex} is outside of 1..={vertices}")]
    VertexOutOfRange { line: usize, vertex: usize, vertices: usize },
}

fn parse_token<T: std::str::FromStr>(line: usize, token: &str) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::InvalidToken {
        line,
        token: token.to_string(),
    })
}

/// Parses `p <kind> <a> <b>`.
fn parse_header(line: usize, content: &str, kind: &str) -> Result<(usize, usize), ParseError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    let invalid = || ParseError::InvalidHeader {
        line,
        content: content.to_string(),
    };
    if parts.len() != 4 || parts[1] != kind {
        return Err(invalid());
    }
    let a = parts[2].parse().map_err(|_| invalid())?;
    let b = parts[3].parse().map_err(|_| invalid())?;
    Ok((a, b))
}

/// Parses a CNF formula in DIMACS format.
///
/// - Lines starting with `c` are comments, except `c vo <v1> <v2> ...`
///   which gives a decision order.
/// - The problem line is `p cnf <num_vars> <num_clauses>`.
/// - Clauses are literals terminated by `0` and may span several lines.
pub fn parse_cnf<R: Read>(reader: R) -> Result<Cnf, ParseError> {
    let mut cnf: Option<Cnf> = None;
    let mut expected_clauses = 0;
    let mut order: Option<(usize, Vec<u32>)> = None;
    let mut clause: Vec<i32> = Vec::new();

    for (i, line) in BufReader::new(reader).lines().enumerate() {
        let line_num = i + 1;
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if line.starts_with('c') {
            let mut parts = line.split_whitespace().skip(1);
            if parts.next() == Some("vo") {
                let vars = parts
                    .map(|token| parse_token::<u32>(line_num, token))
                    .collect::<Result<Vec<_>, _>>()?;
                order = Some((line_num, vars));
            }
            continue;
        }

        // SATLIB end marker.
        if line.starts_with('%') {
            break;
        }

        if line.starts_with('p') {
            let (num_vars, num_clauses) = parse_header(line_num, line, "cnf")?;
            expected_clauses = num_clauses;
            cnf = Some(Cnf::new(num_vars));
            continue;
        }

        let Some(cnf) = cnf.as_mut() else {
            return Err(ParseError::MissingHeader("cnf"));
        };
        for token in line.split_whitespace() {
            let literal: i32 = parse_token(line_num, token)?;
            if literal == 0 {
                cnf.clauses.push(std::mem::take(&mut clause));
                continue;
            }
            if literal.unsigned_abs() as usize > cnf.num_vars {
                return Err(ParseError::LiteralOutOfRange {
                    line: line_num,
                    literal,
                    num_vars: cnf.num_vars,
                });
            }
            clause.push(literal);
        }
    }

    let mut cnf = cnf.ok_or(ParseError::MissingHeader("cnf"))?;
    if !clause.is_empty() {
        warn!("Last clause is not terminated by 0");
        cnf.clauses.push(clause);
    }
    if cnf.clauses.len() != expected_clauses {
        warn!(
            "Expected {} clauses but parsed {}",
            expected_clauses,
            cnf.clauses.len()
        );
    }

    if let Some((line, order)) = order {
        if let Some(&var) = order.iter().find(|&&v| v == 0 || v as usize > cnf.num_vars) {
            return Err(ParseError::LiteralOutOfRange {
                line,
                literal: var as i32,
                num_vars: cnf.num_vars,
            });
        }
        cnf.order = Some(order);
    }

    debug!(
        "Parsed CNF with {} variables and {} clauses",
        cnf.num_vars,
        cnf.clauses.len()
    );
    Ok(cnf)
}

/// Parses an undirected graph in DIMACS `.col` format.
///
/// The problem line is `p edge <vertices> <edges>`; edges are given as
/// `e <u> <v>` with 1-based vertices.
pub fn parse_col<R: Read>(reader: R) -> Result<Graph, ParseError> {
    let mut graph: Option<Graph> = None;
    let mut expected_edges = 0;
    let mut edges = 0;

    for (i, line) in BufReader::new(reader).lines().enumerate() {
        let line_num = i + 1;
        let line = line?;
        let line = line.trim();

        if line.is_empty() || line.starts_with('c') {
            continue;
        }

        if line.starts_with('p') {
            let (vertices, num_edges) = parse_header(line_num, line, "edge")?;
            expected_edges = num_edges;
            graph = Some(Graph::new(vertices));
            continue;
        }

        if line.starts_with('e') {
            let Some(graph) = graph.as_mut() else {
                return Err(ParseError::MissingHeader("edge"));
            };
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 3 {
                return Err(ParseError::InvalidToken {
                    line: line_num,
                    token: line.to_string(),
                });
            }
            let endpoint = |token: &str| -> Result<usize, ParseError> {
                let vertex: usize = parse_token(line_num, token)?;
                if vertex == 0 || vertex > graph.vertices() {
                    return Err(ParseError::VertexOutOfRange {
                        line: line_num,
                        vertex,
                        vertices: graph.vertices(),
                    });
                }
                Ok(vertex - 1)
            };
            let u = endpoint(parts[1])?;
            let v = endpoint(parts[2])?;
            graph.add_edge(u, v);
            edges += 1;
            continue;
        }

        debug!("Ignoring line {}: {}", line_num, line);
    }

    let graph = graph.ok_or(ParseError::MissingHeader("edge"))?;
    if edges != expected_edges {
        warn!("Expected {} edges but parsed {}", expected_edges, edges);
    }
    debug!("Parsed graph with {} vertices and {} edges", graph.vertices(), edges);
    Ok(graph)
}
