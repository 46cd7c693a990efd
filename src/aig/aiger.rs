//! Reading and writing combinational AIGER files.
//!
//! Both the ASCII (`aag`) and the binary (`aig`) format are supported.
//! The core is purely combinational, so files with latches are rejected.

use std::error::Error;
use std::fmt;
use std::io::{self, BufRead, Write};

use super::{Aig, Edge};

/// The serialization mode for an AIGER file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AigerMode {
    /// Human-readable `aag` format.
    Ascii,
    /// Compact `aig` format with delta-encoded fanin pairs.
    Binary,
}

/// An error while reading an AIGER file.
#[derive(Debug)]
pub enum AigerError {
    Io(io::Error),
    Parse { line: usize, message: String },
}

impl fmt::Display for AigerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {}", e),
            Self::Parse { line, message } => write!(f, "line {}: {}", line, message),
        }
    }
}

impl Error for AigerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse { .. } => None,
        }
    }
}

impl From<io::Error> for AigerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

fn parse_error(line: usize, message: impl Into<String>) -> AigerError {
    AigerError::Parse {
        line,
        message: message.into(),
    }
}

fn read_number_line<R: BufRead>(
    reader: &mut R,
    line: &mut String,
    line_no: &mut usize,
) -> Result<usize, AigerError> {
    line.clear();
    *line_no += 1;
    if reader.read_line(line)? == 0 {
        return Err(parse_error(*line_no, "unexpected end of file"));
    }
    line.trim()
        .split_whitespace()
        .next()
        .ok_or_else(|| parse_error(*line_no, "expected a literal"))?
        .parse::<usize>()
        .map_err(|e| parse_error(*line_no, format!("bad literal: {}", e)))
}

struct Header {
    max_var: usize,
    n_inputs: usize,
    n_latches: usize,
    n_outputs: usize,
    n_ands: usize,
}

fn parse_header(line: &str) -> Result<(bool, Header), AigerError> {
    let mut tokens = line.split_whitespace();
    let magic = tokens.next().ok_or_else(|| parse_error(1, "empty header"))?;
    let binary = match magic {
        "aag" => false,
        "aig" => true,
        other => {
            return Err(parse_error(1, format!("unknown format '{}'", other)));
        }
    };
    let mut next_count = |name: &str| -> Result<usize, AigerError> {
        tokens
            .next()
            .ok_or_else(|| parse_error(1, format!("missing {} count", name)))?
            .parse::<usize>()
            .map_err(|e| parse_error(1, format!("bad {} count: {}", name, e)))
    };
    let header = Header {
        max_var: next_count("variable")?,
        n_inputs: next_count("input")?,
        n_latches: next_count("latch")?,
        n_outputs: next_count("output")?,
        n_ands: next_count("and")?,
    };
    if header.n_latches != 0 {
        return Err(parse_error(
            1,
            "latches are not supported; build a combinational miter first",
        ));
    }
    if header.max_var < header.n_inputs + header.n_ands {
        return Err(parse_error(1, "variable count smaller than inputs + ands"));
    }
    Ok((binary, header))
}

/// Reads a combinational AIGER file in either format.
pub fn read_aiger<R: BufRead>(mut reader: R) -> Result<Aig, AigerError> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let (binary, header) = parse_header(&line)?;

    let mut aig = Aig::new();
    // aiger variable -> edge; aiger variable 0 is constant false
    let mut map = vec![Edge::NONE; header.max_var + 1];
    map[0] = Edge::FALSE;

    let lit_to_edge = |map: &[Edge], lit: usize, line_no: usize| -> Result<Edge, AigerError> {
        let var = lit >> 1;
        let edge = *map
            .get(var)
            .ok_or_else(|| parse_error(line_no, format!("literal {} out of range", lit)))?;
        if edge == Edge::NONE {
            return Err(parse_error(
                line_no,
                format!("literal {} used before definition", lit),
            ));
        }
        Ok(edge.invert_if(lit & 1 != 0))
    };

    let mut line_no = 1;

    if binary {
        // inputs are implicit
        for i in 0..header.n_inputs {
            map[i + 1] = aig.fresh_input();
        }
        let mut output_lits = Vec::with_capacity(header.n_outputs);
        for _ in 0..header.n_outputs {
            output_lits.push(read_number_line(&mut reader, &mut line, &mut line_no)?);
        }
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let mut pos = 0;
        let mut read_delta = |line_no: usize| -> Result<usize, AigerError> {
            let mut value = 0usize;
            let mut shift = 0;
            loop {
                let byte = *bytes
                    .get(pos)
                    .ok_or_else(|| parse_error(line_no, "truncated delta encoding"))?;
                pos += 1;
                value |= ((byte & 0x7f) as usize) << shift;
                if byte & 0x80 == 0 {
                    return Ok(value);
                }
                shift += 7;
            }
        };
        for i in 0..header.n_ands {
            let lhs = 2 * (header.n_inputs + i + 1);
            let delta0 = read_delta(line_no)?;
            let delta1 = read_delta(line_no)?;
            let rhs0 = lhs
                .checked_sub(delta0)
                .ok_or_else(|| parse_error(line_no, "fanin delta out of range"))?;
            let rhs1 = rhs0
                .checked_sub(delta1)
                .ok_or_else(|| parse_error(line_no, "fanin delta out of range"))?;
            let e0 = lit_to_edge(&map, rhs0, line_no)?;
            let e1 = lit_to_edge(&map, rhs1, line_no)?;
            map[lhs >> 1] = aig.and_edge(e0, e1);
        }
        for lit in output_lits {
            let edge = lit_to_edge(&map, lit, line_no)?;
            aig.add_output(edge);
        }
    } else {
        for _ in 0..header.n_inputs {
            let lit = read_number_line(&mut reader, &mut line, &mut line_no)?;
            if lit & 1 != 0 || lit == 0 {
                return Err(parse_error(line_no, "input literal must be even and nonzero"));
            }
            let var = lit >> 1;
            if var > header.max_var || map[var] != Edge::NONE {
                return Err(parse_error(line_no, "invalid or repeated input literal"));
            }
            map[var] = aig.fresh_input();
        }
        let mut output_lits = Vec::with_capacity(header.n_outputs);
        for _ in 0..header.n_outputs {
            output_lits.push(read_number_line(&mut reader, &mut line, &mut line_no)?);
        }
        for _ in 0..header.n_ands {
            line.clear();
            line_no += 1;
            if reader.read_line(&mut line)? == 0 {
                return Err(parse_error(line_no, "unexpected end of file"));
            }
            let mut tokens = line.split_whitespace();
            let mut next_lit = |name: &str| -> Result<usize, AigerError> {
                tokens
                    .next()
                    .ok_or_else(|| parse_error(line_no, format!("missing {} literal", name)))?
                    .parse::<usize>()
                    .map_err(|e| parse_error(line_no, format!("bad {} literal: {}", name, e)))
            };
            let lhs = next_lit("gate")?;
            let rhs0 = next_lit("fanin")?;
            let rhs1 = next_lit("fanin")?;
            if lhs & 1 != 0 || lhs >> 1 > header.max_var {
                return Err(parse_error(line_no, "invalid gate literal"));
            }
            if map[lhs >> 1] != Edge::NONE {
                return Err(parse_error(line_no, "repeated gate literal"));
            }
            let e0 = lit_to_edge(&map, rhs0, line_no)?;
            let e1 = lit_to_edge(&map, rhs1, line_no)?;
            map[lhs >> 1] = aig.and_edge(e0, e1);
        }
        for lit in output_lits {
            let edge = lit_to_edge(&map, lit, line_no)?;
            aig.add_output(edge);
        }
    }
    Ok(aig)
}

/// Writes the graph as a combinational AIGER file.
///
/// # Errors
///
/// Returns an error if an I/O error occurs during writing.
pub fn write_aiger<W: Write>(aig: &Aig, mut writer: W, mode: AigerMode) -> io::Result<()> {
    // number the live nodes: inputs first, then ANDs in topological order
    let mut var_of = vec![0u32; aig.num_nodes()];
    let mut next_var = 1u32;
    for pi in aig.inputs() {
        var_of[pi as usize] = next_var;
        next_var += 1;
    }
    let topo = aig.dfs_topological(aig.outputs());
    let mut ands = Vec::new();
    for &n in &topo {
        if aig.is_and(n) {
            var_of[n as usize] = next_var;
            next_var += 1;
            ands.push(n);
        }
    }

    let edge_lit = |e: Edge| -> u32 {
        if e.is_constant() {
            u32::from(e == Edge::TRUE)
        } else {
            2 * var_of[e.node() as usize] + u32::from(e.is_inverted())
        }
    };

    let max_var = next_var - 1;
    writeln!(
        writer,
        "{} {} {} 0 {} {}",
        match mode {
            AigerMode::Ascii => "aag",
            AigerMode::Binary => "aig",
        },
        max_var,
        aig.num_inputs(),
        aig.num_outputs(),
        ands.len()
    )?;

    match mode {
        AigerMode::Ascii => {
            for pi in aig.inputs() {
                writeln!(writer, "{}", 2 * var_of[pi as usize])?;
            }
            for &out in aig.outputs() {
                writeln!(writer, "{}", edge_lit(out))?;
            }
            for &n in &ands {
                let lhs = 2 * var_of[n as usize];
                let l0 = edge_lit(aig.fanin0(n));
                let l1 = edge_lit(aig.fanin1(n));
                writeln!(writer, "{} {} {}", lhs, l0.max(l1), l0.min(l1))?;
            }
        }
        AigerMode::Binary => {
            for &out in aig.outputs() {
                writeln!(writer, "{}", edge_lit(out))?;
            }
            let mut write_delta = |writer: &mut W, mut delta: u32| -> io::Result<()> {
                loop {
                    let byte = (delta & 0x7f) as u8;
                    delta >>= 7;
                    if delta == 0 {
                        writer.write_all(&[byte])?;
                        return Ok(());
                    }
                    writer.write_all(&[byte | 0x80])?;
                }
            };
            for &n in &ands {
                let lhs = 2 * var_of[n as usize];
                let l0 = edge_lit(aig.fanin0(n));
                let l1 = edge_lit(aig.fanin1(n));
                let rhs0 = l0.max(l1);
                let rhs1 = l0.min(l1);
                debug_assert!(lhs > rhs0);
                write_delta(&mut writer, lhs - rhs0)?;
                write_delta(&mut writer, rhs0 - rhs1)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn example_aig() -> Aig {
        let mut aig = Aig::new();
        let a = aig.fresh_input();
        let b = aig.fresh_input();
        let c = aig.fresh_input();
        let ab = aig.and_edge(a, b);
        let abc = aig.and_edge(ab, !c);
        aig.add_output(!abc);
        aig
    }

    fn round_trip(aig: &Aig, mode: AigerMode) -> Aig {
        let mut buffer = Vec::new();
        write_aiger(aig, &mut buffer, mode).unwrap();
        read_aiger(BufReader::new(&buffer[..])).unwrap()
    }

    #[test]
    fn test_ascii_round_trip() {
        let aig = example_aig();
        let back = round_trip(&aig, AigerMode::Ascii);
        assert_eq!(back.num_inputs(), 3);
        assert_eq!(back.num_outputs(), 1);
        assert_eq!(back.num_ands(), 2);
        for pattern in 0..8u32 {
            let bits: Vec<bool> = (0..3).map(|i| pattern >> i & 1 != 0).collect();
            assert_eq!(aig.evaluate(&bits), back.evaluate(&bits));
        }
    }

    #[test]
    fn test_binary_round_trip() {
        let aig = example_aig();
        let back = round_trip(&aig, AigerMode::Binary);
        assert_eq!(back.num_inputs(), 3);
        assert_eq!(back.num_ands(), 2);
        for pattern in 0..8u32 {
            let bits: Vec<bool> = (0..3).map(|i| pattern >> i & 1 != 0).collect();
            assert_eq!(aig.evaluate(&bits), back.evaluate(&bits));
        }
    }

    #[test]
    fn test_rejects_latches() {
        let input = "aag 1 0 1 0 0\n2 3\n";
        let err = read_aiger(BufReader::new(input.as_bytes())).unwrap_err();
        assert!(matches!(err, AigerError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_rejects_use_before_definition() {
        let input = "aag 3 1 0 1 2\n2\n6\n4 6 2\n6 2 2\n";
        let err = read_aiger(BufReader::new(input.as_bytes())).unwrap_err();
        assert!(matches!(err, AigerError::Parse { .. }));
    }

    #[test]
    fn test_constant_output() {
        let input = "aag 0 0 0 1 0\n1\n";
        let aig = read_aiger(BufReader::new(input.as_bytes())).unwrap();
        assert_eq!(aig.output(0), Edge::TRUE);
    }
}
