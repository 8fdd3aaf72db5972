//! Named-pipe query server: reads one request per line from
//! `/tmp/stoap-in`, writes one CSV record per queried cell to
//! `/tmp/stoap-out`, and closes the output FIFO to signal end-of-answer.

use aggcube::environment::Environment;
use aggcube::error::{Error, Result};
use aggcube::key::ElementId;
use aggcube::result::CellAnswer;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

const IN_PIPE: &str = "/tmp/stoap-in";
const OUT_PIPE: &str = "/tmp/stoap-out";

/// Creates the request/response FIFOs (if they don't already exist) and
/// serves requests until the input pipe's writer closes.
pub fn run(env: &Environment) -> Result<()> {
    ensure_fifo(IN_PIPE)?;
    ensure_fifo(OUT_PIPE)?;

    loop {
        log::info!("waiting for a client to open {IN_PIPE}");
        let reader = File::open(IN_PIPE)
            .map_err(|e| Error::FileNotFound(format!("{IN_PIPE}: {e}")))?;
        let reader = BufReader::new(reader);

        for line in reader.lines() {
            let line = line.map_err(|e| Error::CorruptFile(format!("reading request: {e}")))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            log::debug!("request: {line}");
            let records = handle_request(env, line);

            let mut writer = File::create(OUT_PIPE)
                .map_err(|e| Error::FileNotFound(format!("{OUT_PIPE}: {e}")))?;
            for record in records {
                writeln!(writer, "{record}")
                    .map_err(|e| Error::CorruptFile(format!("writing response: {e}")))?;
            }
            // Dropping `writer` closes the FIFO, signaling end-of-answer.
        }
    }
}

fn ensure_fifo(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        return Ok(());
    }
    let mode = Mode::from_bits_truncate(0o666);
    mkfifo(path, mode).map_err(|e| Error::Internal(format!("mkfifo {path}: {e}")))
}

/// Dispatches one request line to `/cell/values` or `/cell/area` and
/// renders each answer as a `type;found;value;path;;zero;` record.
fn handle_request(env: &Environment, request: &str) -> Vec<String> {
    match dispatch(env, request) {
        Ok(records) => records,
        Err(e) => {
            log::warn!("request {request:?} failed: {e}");
            Vec::new()
        }
    }
}

fn dispatch(env: &Environment, request: &str) -> Result<Vec<String>> {
    let (route, query) = request
        .split_once('?')
        .ok_or_else(|| Error::InvalidCoordinates(format!("malformed request: {request:?}")))?;

    let params = parse_query_string(query);
    let cube_id: ElementId = params
        .get("cube")
        .ok_or_else(|| Error::ParameterMissing("cube".into()))?
        .parse()
        .map_err(|_| Error::InvalidCoordinates("cube id is not numeric".into()))?;
    let cube = env
        .cube_by_id(cube_id)
        .ok_or_else(|| Error::InvalidCoordinates(format!("no such cube: {cube_id}")))?;

    match route {
        "/cell/values" => {
            let raw = params
                .get("paths")
                .ok_or_else(|| Error::ParameterMissing("paths".into()))?;
            let paths: Vec<Vec<ElementId>> = raw
                .split(':')
                .map(parse_id_list)
                .collect::<Result<_>>()?;
            let answers = aggcube::query::answer_paths(cube, &paths)?;
            Ok(paths
                .into_iter()
                .zip(answers)
                .map(|(path, answer)| render_record(&path, answer))
                .collect())
        }
        "/cell/area" => {
            let raw = params
                .get("area")
                .ok_or_else(|| Error::ParameterMissing("area".into()))?;
            let id_lists: Vec<Vec<ElementId>> = raw
                .split(',')
                .map(parse_area_dim)
                .collect::<Result<_>>()?;
            let answers = aggcube::query::answer_area(cube, &id_lists)?;
            Ok(answers
                .iter()
                .map(|(path, answer)| render_record(path, *answer))
                .collect())
        }
        _ => Err(Error::InvalidCoordinates(format!("unknown route: {route}"))),
    }
}

fn parse_query_string(query: &str) -> std::collections::HashMap<&str, &str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect()
}

fn parse_id_list(field: &str) -> Result<Vec<ElementId>> {
    field
        .split(',')
        .map(|id| {
            id.parse::<ElementId>()
                .map_err(|_| Error::InvalidCoordinates(format!("not an element id: {id:?}")))
        })
        .collect()
}

/// Parses one `/cell/area` dimension field: ids within a dimension are
/// `:`-separated (the top-level `area` value is `,`-separated per
/// dimension, the reverse of `/cell/values`'s `paths` grammar).
fn parse_area_dim(field: &str) -> Result<Vec<ElementId>> {
    field
        .split(':')
        .map(|id| {
            id.parse::<ElementId>()
                .map_err(|_| Error::InvalidCoordinates(format!("not an element id: {id:?}")))
        })
        .collect()
}

fn render_record(path: &[ElementId], answer: CellAnswer) -> String {
    let path_str = path
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let (found, value) = match answer.value() {
        // 1 integer digit + 14 fractional digits = 15 significant digits.
        Some(v) => ("1", format!("{v:.14e}")),
        None => ("0", String::new()),
    };
    format!("1;{found};{value};{path_str};;0;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggcube::cube::Cube;
    use aggcube::dimension::{Dimension, RawElement};
    use aggcube::element::ElementKind;
    use std::sync::Arc;
    use test_log::test;

    fn env() -> Environment {
        let dim = Arc::new(
            Dimension::build(
                1,
                "d0",
                vec![
                    RawElement {
                        id: 0,
                        name: "b0".into(),
                        position: 0,
                        kind: ElementKind::Base,
                        parents: vec![],
                        children: vec![],
                    },
                    RawElement {
                        id: 1,
                        name: "b1".into(),
                        position: 1,
                        kind: ElementKind::Base,
                        parents: vec![],
                        children: vec![],
                    },
                ],
            )
            .unwrap(),
        );
        let cube = Arc::new(Cube::build(7, "sales", vec![dim], vec![(vec![0], 10.0), (vec![1], 20.0)]).unwrap());
        Environment::new(vec![], vec![cube])
    }

    #[test]
    fn cell_values_renders_one_record_per_path() {
        let records = dispatch(&env(), "/cell/values?cube=7&paths=0:1").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].starts_with("1;1;1.00000000000000e1;0;;0;"));
        assert!(records[1].starts_with("1;1;2.00000000000000e1;1;;0;"));
    }

    #[test]
    fn cell_area_renders_one_record_per_combination() {
        // One dimension, two `:`-separated ids within it.
        let records = dispatch(&env(), "/cell/area?cube=7&area=0:1").unwrap();
        assert_eq!(records.len(), 2);
    }

    fn two_dim_env() -> Environment {
        let d0 = Arc::new(
            Dimension::build(
                1,
                "d0",
                vec![
                    RawElement {
                        id: 0,
                        name: "b0".into(),
                        position: 0,
                        kind: ElementKind::Base,
                        parents: vec![],
                        children: vec![],
                    },
                    RawElement {
                        id: 1,
                        name: "b1".into(),
                        position: 1,
                        kind: ElementKind::Base,
                        parents: vec![],
                        children: vec![],
                    },
                ],
            )
            .unwrap(),
        );
        let d1 = Arc::new(
            Dimension::build(
                2,
                "d1",
                vec![
                    RawElement {
                        id: 0,
                        name: "x0".into(),
                        position: 0,
                        kind: ElementKind::Base,
                        parents: vec![],
                        children: vec![],
                    },
                    RawElement {
                        id: 1,
                        name: "x1".into(),
                        position: 1,
                        kind: ElementKind::Base,
                        parents: vec![],
                        children: vec![],
                    },
                ],
            )
            .unwrap(),
        );
        let facts = vec![
            (vec![0, 0], 1.0),
            (vec![0, 1], 2.0),
            (vec![1, 0], 3.0),
            (vec![1, 1], 4.0),
        ];
        let cube = Arc::new(Cube::build(9, "sales", vec![d0, d1], facts).unwrap());
        Environment::new(vec![], vec![cube])
    }

    #[test]
    fn cell_area_separates_dimensions_by_comma_and_ids_by_colon() {
        // Dimension 0 gets ids {0,1} (colon-separated), dimension 1 is
        // fixed to id 0: comma separates the two dimension fields.
        let records = dispatch(&two_dim_env(), "/cell/area?cube=9&area=0:1,0").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.starts_with("1;1;1.00000000000000e0;0,0;;0;")));
        assert!(records.iter().any(|r| r.starts_with("1;1;3.00000000000000e0;1,0;;0;")));
    }

    #[test]
    fn missing_cube_param_is_rejected() {
        let err = dispatch(&env(), "/cell/values?paths=0").unwrap_err();
        assert!(matches!(err, Error::ParameterMissing(_)));
    }

    #[test]
    fn unknown_cube_id_is_rejected() {
        let err = dispatch(&env(), "/cell/values?cube=99&paths=0").unwrap_err();
        assert!(matches!(err, Error::InvalidCoordinates(_)));
    }

    #[test]
    fn not_found_cell_has_empty_value_field() {
        let dim = Arc::new(
            Dimension::build(
                1,
                "d0",
                vec![RawElement {
                    id: 5,
                    name: "b5".into(),
                    position: 0,
                    kind: ElementKind::Base,
                    parents: vec![],
                    children: vec![],
                }],
            )
            .unwrap(),
        );
        let cube = Arc::new(Cube::build(1, "empty", vec![dim], vec![]).unwrap());
        let e = Environment::new(vec![], vec![cube]);
        let records = dispatch(&e, "/cell/values?cube=1&paths=5").unwrap();
        assert_eq!(records[0], "1;0;;5;;0;");
    }
}
