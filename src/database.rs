//! Database loader: parses `database.csv` and per-cube fact files into an
//! [`Environment`]. A fixed-contract external collaborator, not part of
//! the aggregation core.

use crate::cube::Cube;
use crate::dimension::{Dimension, RawElement};
use crate::element::ElementKind;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::key::ElementId;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const SUB_CHAR: char = '\u{1a}';

/// A raw line, stripped of `\r` and ASCII SUB, with comments and blanks
/// already filtered out by [`read_lines`].
struct Lines {
    lines: Vec<String>,
    pos: usize,
}

impl Lines {
    fn next_header(&mut self) -> Option<String> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos].clone();
            self.pos += 1;
            if let Some(stripped) = line.strip_prefix('[') {
                if let Some(name) = stripped.strip_suffix(']') {
                    return Some(name.to_owned());
                }
            }
        }
        None
    }

    fn take_data_lines(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while self.pos < self.lines.len() && !self.lines[self.pos].starts_with('[') {
            out.push(self.lines[self.pos].clone());
            self.pos += 1;
        }
        out
    }

    fn expect_section(&mut self, expected: &str) -> Result<()> {
        match self.next_header() {
            Some(name) if name == expected => Ok(()),
            Some(name) => Err(Error::CorruptFile(format!(
                "expected section [{expected}], found [{name}]"
            ))),
            None => Err(Error::CorruptFile(format!(
                "expected section [{expected}], found end of file"
            ))),
        }
    }
}

fn read_lines(path: &Path) -> Result<Lines> {
    let content = fs::read_to_string(path)
        .map_err(|_| Error::FileNotFound(path.display().to_string()))?;

    let lines = content
        .lines()
        .map(|line| line.trim_end_matches('\r').replace(SUB_CHAR, ""))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    Ok(Lines { lines, pos: 0 })
}

/// Splits a `;`-separated line into fields, honoring `"`-quoted fields
/// with `""` as the escaped-quote sequence.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.is_empty() {
            in_quotes = true;
        } else if c == ';' {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

fn split_sublist(field: &str) -> Vec<&str> {
    if field.is_empty() {
        Vec::new()
    } else {
        field.split(',').collect()
    }
}

fn parse_id(field: &str) -> Result<ElementId> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::ConversionFailed(format!("not a valid element id: {field:?}")))
}

fn parse_f64(field: &str) -> Result<f64> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::ConversionFailed(format!("not a valid number: {field:?}")))
}

struct DimensionHeader {
    id: ElementId,
    name: String,
}

struct CubeHeader {
    id: ElementId,
    name: String,
    dim_ids: Vec<ElementId>,
}

/// Loads a full database directory into an [`Environment`].
pub fn load_database(dir: &Path) -> Result<Environment> {
    let mut lines = read_lines(&dir.join("database.csv"))?;

    lines.expect_section("DATABASE")?;
    let database_header = lines.take_data_lines();
    let _dim_count: usize = database_header
        .first()
        .ok_or_else(|| Error::CorruptFile("[DATABASE] section is empty".into()))
        .and_then(|l| {
            l.trim()
                .parse()
                .map_err(|_| Error::ConversionFailed("bad dimension count".into()))
        })?;

    lines.expect_section("DIMENSIONS")?;
    let mut dim_headers = Vec::new();
    for line in lines.take_data_lines() {
        let fields = split_fields(&line);
        if fields.len() < 3 {
            return Err(Error::CorruptFile(format!("malformed [DIMENSIONS] row: {line}")));
        }
        let kind: u32 = fields[2]
            .trim()
            .parse()
            .map_err(|_| Error::ConversionFailed("bad dimension type".into()))?;
        if kind != 1 {
            continue;
        }
        dim_headers.push(DimensionHeader {
            id: parse_id(&fields[0])?,
            name: fields[1].clone(),
        });
    }

    lines.expect_section("CUBES")?;
    let mut cube_headers = Vec::new();
    for line in lines.take_data_lines() {
        let fields = split_fields(&line);
        if fields.len() < 4 {
            return Err(Error::CorruptFile(format!("malformed [CUBES] row: {line}")));
        }
        let kind: u32 = fields[3]
            .trim()
            .parse()
            .map_err(|_| Error::ConversionFailed("bad cube type".into()))?;
        if kind != 2 && kind != 7 {
            continue;
        }
        let dim_ids = split_sublist(&fields[2])
            .iter()
            .map(|f| parse_id(f))
            .collect::<Result<Vec<_>>>()?;
        cube_headers.push(CubeHeader {
            id: parse_id(&fields[0])?,
            name: fields[1].clone(),
            dim_ids,
        });
    }

    let mut dimensions: Vec<Arc<Dimension>> = Vec::with_capacity(dim_headers.len());
    for header in &dim_headers {
        lines.expect_section(&format!("DIMENSION {}", header.id))?;
        let _overview = lines.take_data_lines();

        lines.expect_section(&format!("ELEMENTS DIMENSION {}", header.id))?;
        let element_lines = lines.take_data_lines();

        let known_ids: std::collections::HashSet<ElementId> = element_lines
            .iter()
            .filter_map(|l| split_fields(l).first().and_then(|f| parse_id(f).ok()))
            .collect();

        let mut raw_elements = Vec::with_capacity(element_lines.len());
        for line in &element_lines {
            let fields = split_fields(line);
            if fields.len() < 10 {
                log::warn!("skipping malformed element row in dimension {}: {line}", header.id);
                continue;
            }
            let kind_code: u32 = match fields[3].trim().parse() {
                Ok(k) => k,
                Err(_) => {
                    log::warn!("skipping element row with bad kind in dimension {}: {line}", header.id);
                    continue;
                }
            };
            let kind = match kind_code {
                1 => ElementKind::Base,
                4 => ElementKind::Consolidated,
                2 => continue, // string element, dropped at load
                _ => {
                    log::warn!("skipping element row with unknown kind {kind_code} in dimension {}", header.id);
                    continue;
                }
            };

            let id = match parse_id(&fields[0]) {
                Ok(id) => id,
                Err(_) => continue,
            };
            let position: u32 = fields[2].trim().parse().unwrap_or(0);

            let parents: Vec<ElementId> = split_sublist(&fields[7])
                .iter()
                .filter_map(|f| parse_id(f).ok())
                .filter(|id| {
                    let known = known_ids.contains(id);
                    if !known {
                        log::warn!("dropping unknown parent {id} referenced by element {}", fields[0]);
                    }
                    known
                })
                .collect();

            let child_ids: Vec<ElementId> = split_sublist(&fields[8])
                .iter()
                .filter_map(|f| parse_id(f).ok())
                .collect();
            let child_weights: Vec<f64> = split_sublist(&fields[9])
                .iter()
                .map(|f| parse_f64(f).unwrap_or(1.0))
                .collect();

            let children: Vec<(ElementId, f64)> = child_ids
                .into_iter()
                .enumerate()
                .filter_map(|(i, cid)| {
                    if !known_ids.contains(&cid) {
                        log::warn!("dropping unknown child {cid} referenced by element {id}");
                        return None;
                    }
                    let weight = child_weights.get(i).copied().unwrap_or(1.0);
                    Some((cid, weight))
                })
                .collect();

            raw_elements.push(RawElement {
                id,
                name: fields[1].clone(),
                position,
                kind,
                parents,
                children,
            });
        }

        dimensions.push(Arc::new(Dimension::build(header.id, &header.name, raw_elements)?));
    }

    let mut cubes: Vec<Arc<Cube>> = Vec::with_capacity(cube_headers.len());
    for header in &cube_headers {
        let cube_dims: Vec<Arc<Dimension>> = header
            .dim_ids
            .iter()
            .filter_map(|id| dimensions.iter().find(|d| d.id() == *id).cloned())
            .collect();
        if cube_dims.len() != header.dim_ids.len() {
            return Err(Error::CorruptFile(format!(
                "cube {} references an unloaded dimension",
                header.id
            )));
        }

        let facts = load_cube_facts(dir, header.id, cube_dims.len())?;
        cubes.push(Arc::new(Cube::build(header.id, &header.name, cube_dims, facts)?));
    }

    Ok(Environment::new(dimensions, cubes))
}

fn load_cube_facts(dir: &Path, cube_id: ElementId, dim_count: usize) -> Result<Vec<(Vec<ElementId>, f64)>> {
    let path = dir.join(format!("database_CUBE_{cube_id}.csv"));
    let mut lines = read_lines(&path)?;

    lines.expect_section("CUBE")?;
    let _dim_sizes = lines.take_data_lines();

    let Some(section) = lines.next_header() else {
        return Ok(Vec::new());
    };
    if section != "NUMERIC" {
        return Err(Error::CorruptFile(format!(
            "expected section [NUMERIC] in cube {cube_id}, found [{section}]"
        )));
    }

    let mut facts = Vec::new();
    for line in lines.take_data_lines() {
        let fields = split_fields(&line);
        if fields.len() < 2 {
            return Err(Error::CorruptFile(format!("malformed [NUMERIC] row in cube {cube_id}: {line}")));
        }
        let tuple: Vec<ElementId> = split_sublist(&fields[0])
            .iter()
            .map(|f| parse_id(f))
            .collect::<Result<Vec<_>>>()?;
        if tuple.len() != dim_count {
            return Err(Error::CorruptFile(format!(
                "fact tuple in cube {cube_id} has {} ids, expected {dim_count}",
                tuple.len()
            )));
        }
        let value = parse_f64(&fields[1])?;
        facts.push((tuple, value));
    }

    // A trailing [STRING] section, if present, is scanned and ignored.
    if lines.next_header().as_deref() == Some("STRING") {
        let _ = lines.take_data_lines();
    }

    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use test_log::test;

    /// Writes a two-dimensional worked example database: D0 = {b0,
    /// b1, c0(b0:1, b1:2)}, D1 = {x0, x1}, with base facts (b0,x0)=10,
    /// (b0,x1)=20, (b1,x0)=3, (b1,x1)=4.
    fn write_worked_example(dir: &Path) {
        let database_csv = "\
[DATABASE]
2
[DIMENSIONS]
1;D0;1;
2;D1;1;
[CUBES]
1;C;1,2;2
[DIMENSION 1]
;1;1;1;3
[ELEMENTS DIMENSION 1]
0;b0;0;1;0;1;1;2;;
1;b1;1;1;0;1;1;2;;
2;c0;2;4;1;0;0;;0,1;1,2
[DIMENSION 2]
;0;1;0;2
[ELEMENTS DIMENSION 2]
0;x0;0;1;0;1;1;;;
1;x1;1;1;0;1;1;;;
";
        fs::write(dir.join("database.csv"), database_csv).unwrap();

        let cube_csv = "\
[CUBE]
3;2
[NUMERIC]
0,0;10
0,1;20
1,0;3
1,1;4
";
        fs::write(dir.join("database_CUBE_1.csv"), cube_csv).unwrap();
    }

    #[test]
    fn loads_the_worked_example_end_to_end() {
        let dir = tempdir().unwrap();
        write_worked_example(dir.path());

        let env = load_database(dir.path()).unwrap();
        assert_eq!(env.dimensions().len(), 2);
        assert_eq!(env.cubes().len(), 1);

        let cube = env.cube_by_name("C").unwrap();
        assert_eq!(cube.storage().len(), 4);

        let d0 = env.dimension_by_name("D0").unwrap();
        let c0 = d0.lookup_by_name("c0").unwrap();
        let expanded = d0.expand_base(c0.id).unwrap();
        assert_eq!(expanded.iter().collect::<Vec<_>>(), vec![(0, 1.0), (1, 2.0)]);
    }

    #[test]
    fn missing_database_file_is_file_not_found() {
        let dir = tempdir().unwrap();
        let err = load_database(dir.path()).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn split_fields_handles_quoted_escaped_values() {
        let fields = split_fields(r#"1;"say ""hi""";3"#);
        assert_eq!(fields, vec!["1", r#"say "hi""#, "3"]);
    }

    #[test]
    fn malformed_numeric_row_arity_is_corrupt_file() {
        let dir = tempdir().unwrap();
        write_worked_example(dir.path());
        let mut f = fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("database_CUBE_1.csv"))
            .unwrap();
        writeln!(f, "0;5").unwrap();

        let err = load_database(dir.path()).unwrap_err();
        assert!(matches!(err, Error::CorruptFile(_)));
    }
}
