//! CSV codec for problems and solutions.
//!
//! The loader recognizes the header columns `id`/`buffer`/`buffer_id`,
//! `lower`/`start`/`begin`, `upper` (exclusive) or `end` (inclusive), and
//! `size`, plus optional `alignment`, `hint`, `gaps`, and `offset`. Column
//! order is free; the row order defines the stable buffer indices. Capacity
//! is not stored in CSV, so loaded problems carry capacity 0.
//!
//! Gaps are whitespace-separated tokens `L-U` or `L-U@WL:WU`. When the
//! header uses the inclusive `end` spelling, gap bounds are inclusive too.

use crate::problem::{Buffer, Gap, Interval, Problem, ProblemError, Solution};
use memchr::memchr;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors rejecting a CSV document.
#[derive(Error, Debug)]
pub enum CsvError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("missing required column '{name}'")]
    MissingColumn { name: &'static str },

    #[error("duplicate column '{name}'")]
    DuplicateColumn { name: String },

    #[error("unknown column '{name}'")]
    UnknownColumn { name: String },

    #[error("line {line}: expected {expected} fields, got {found}")]
    RowWidth {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Problem(#[from] ProblemError),
}

pub type Result<T> = std::result::Result<T, CsvError>;

/// Emission format for the time columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CsvFormat {
    /// `lower,upper`, half-open.
    #[default]
    New,
    /// `start,end`, inclusive end; gap bounds inclusive as well.
    Old,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Id,
    Lower,
    Upper,
    Size,
    Alignment,
    Hint,
    Gaps,
    Offset,
}

/// Split a line on commas. Fields are trimmed.
fn split_fields(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let mut fields = Vec::new();
    let mut start = 0;
    while let Some(pos) = memchr(b',', &bytes[start..]) {
        fields.push(line[start..start + pos].trim());
        start += pos + 1;
    }
    fields.push(line[start..].trim());
    fields
}

fn parse_number(field: &str, line: usize, what: &str) -> Result<i64> {
    field.parse().map_err(|_| CsvError::Parse {
        line,
        message: format!("invalid {what}: '{field}'"),
    })
}

fn parse_gaps(field: &str, inclusive: bool, line: usize) -> Result<Vec<Gap>> {
    let bump = i64::from(inclusive);
    let mut gaps = Vec::new();
    for token in field.split_whitespace() {
        let (span_part, window_part) = match token.split_once('@') {
            Some((span, window)) => (span, Some(window)),
            None => (token, None),
        };
        let (lower, upper) = span_part.split_once('-').ok_or_else(|| CsvError::Parse {
            line,
            message: format!("invalid gap token: '{token}'"),
        })?;
        let lifespan = Interval::new(
            parse_number(lower, line, "gap bound")?,
            parse_number(upper, line, "gap bound")? + bump,
        );
        let window = match window_part {
            Some(window) => {
                let (wl, wu) = window.split_once(':').ok_or_else(|| CsvError::Parse {
                    line,
                    message: format!("invalid gap window: '{token}'"),
                })?;
                Some(Interval::new(
                    parse_number(wl, line, "gap window bound")?,
                    parse_number(wu, line, "gap window bound")?,
                ))
            }
            None => None,
        };
        gaps.push(Gap { lifespan, window });
    }
    Ok(gaps)
}

/// Parse a problem from CSV text. Loaded problems have capacity 0.
pub fn from_csv(content: &str) -> Result<Problem> {
    let mut lines = content.lines().enumerate();
    let header = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => break line,
            None => return Err(CsvError::MissingColumn { name: "id" }),
        }
    };

    let mut roles = Vec::new();
    let mut inclusive_end = false;
    for name in split_fields(header) {
        let role = match name {
            "id" | "buffer" | "buffer_id" => Role::Id,
            "lower" | "start" | "begin" => Role::Lower,
            "upper" => Role::Upper,
            "end" => {
                inclusive_end = true;
                Role::Upper
            }
            "size" => Role::Size,
            "alignment" => Role::Alignment,
            "hint" => Role::Hint,
            "gaps" => Role::Gaps,
            "offset" => Role::Offset,
            _ => {
                return Err(CsvError::UnknownColumn {
                    name: name.to_string(),
                })
            }
        };
        if roles.contains(&role) {
            return Err(CsvError::DuplicateColumn {
                name: name.to_string(),
            });
        }
        roles.push(role);
    }
    for (role, name) in [
        (Role::Id, "id"),
        (Role::Lower, "lower"),
        (Role::Upper, "upper"),
        (Role::Size, "size"),
    ] {
        if !roles.contains(&role) {
            return Err(CsvError::MissingColumn { name });
        }
    }

    let mut buffers = Vec::new();
    for (index, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let fields = split_fields(line);
        if fields.len() != roles.len() {
            return Err(CsvError::RowWidth {
                line: line_no,
                expected: roles.len(),
                found: fields.len(),
            });
        }

        let mut id = String::new();
        let mut lower = 0;
        let mut upper = 0;
        let mut size = 0;
        let mut alignment = 1;
        let mut hint = None;
        let mut gaps = Vec::new();
        let mut offset = None;
        for (&role, &field) in roles.iter().zip(&fields) {
            match role {
                Role::Id => id = field.to_string(),
                Role::Lower => lower = parse_number(field, line_no, "lower bound")?,
                Role::Upper => {
                    upper = parse_number(field, line_no, "upper bound")? + i64::from(inclusive_end)
                }
                Role::Size => size = parse_number(field, line_no, "size")?,
                Role::Alignment => alignment = parse_number(field, line_no, "alignment")?,
                Role::Hint => {
                    let value = parse_number(field, line_no, "hint")?;
                    hint = (value >= 0).then_some(value);
                }
                Role::Gaps => gaps = parse_gaps(field, inclusive_end, line_no)?,
                Role::Offset => offset = Some(parse_number(field, line_no, "offset")?),
            }
        }
        buffers.push(Buffer {
            id,
            lifespan: Interval::new(lower, upper),
            size,
            alignment,
            gaps,
            offset,
            hint,
        });
    }

    Ok(Problem::new(buffers, 0)?)
}

/// Load a problem from a CSV file.
pub fn from_csv_file<P: AsRef<Path>>(path: P) -> Result<Problem> {
    from_csv(&fs::read_to_string(path)?)
}

fn push_number(out: &mut String, value: i64) {
    let mut buf = itoa::Buffer::new();
    out.push_str(buf.format(value));
}

/// Emit a problem (and optionally its solution) in the default format.
pub fn to_csv(problem: &Problem, solution: Option<&Solution>) -> String {
    to_csv_with_format(problem, solution, CsvFormat::New)
}

/// Emit a problem (and optionally its solution) in the given format.
///
/// Optional columns appear only when some row carries non-default data;
/// an absent hint is written as `-1`.
pub fn to_csv_with_format(
    problem: &Problem,
    solution: Option<&Solution>,
    format: CsvFormat,
) -> String {
    let bump = match format {
        CsvFormat::New => 0,
        CsvFormat::Old => 1,
    };
    let with_alignment = problem.buffers.iter().any(|b| b.alignment != 1);
    let with_hint = problem.buffers.iter().any(|b| b.hint.is_some());
    let with_gaps = problem.buffers.iter().any(|b| !b.gaps.is_empty());
    let with_offset = solution.is_some() || problem.buffers.iter().any(|b| b.offset.is_some());

    let mut out = String::new();
    out.push_str(match format {
        CsvFormat::New => "id,lower,upper",
        CsvFormat::Old => "id,start,end",
    });
    out.push_str(",size");
    if with_alignment {
        out.push_str(",alignment");
    }
    if with_hint {
        out.push_str(",hint");
    }
    if with_gaps {
        out.push_str(",gaps");
    }
    if with_offset {
        out.push_str(",offset");
    }
    out.push('\n');

    for (index, buffer) in problem.buffers.iter().enumerate() {
        out.push_str(&buffer.id);
        out.push(',');
        push_number(&mut out, buffer.lifespan.lower);
        out.push(',');
        push_number(&mut out, buffer.lifespan.upper - bump);
        out.push(',');
        push_number(&mut out, buffer.size);
        if with_alignment {
            out.push(',');
            push_number(&mut out, buffer.alignment);
        }
        if with_hint {
            out.push(',');
            push_number(&mut out, buffer.hint.unwrap_or(-1));
        }
        if with_gaps {
            out.push(',');
            for (k, gap) in buffer.gaps.iter().enumerate() {
                if k > 0 {
                    out.push(' ');
                }
                push_number(&mut out, gap.lifespan.lower);
                out.push('-');
                push_number(&mut out, gap.lifespan.upper - bump);
                if let Some(window) = gap.window {
                    out.push('@');
                    push_number(&mut out, window.lower);
                    out.push(':');
                    push_number(&mut out, window.upper);
                }
            }
        }
        if with_offset {
            out.push(',');
            let offset = solution
                .and_then(|s| s.offsets.get(index).copied())
                .or(buffer.offset)
                .unwrap_or(-1);
            push_number(&mut out, offset);
        }
        out.push('\n');
    }
    out
}

/// Write a problem (and optionally its solution) to a CSV file.
pub fn to_csv_file<P: AsRef<Path>>(
    path: P,
    problem: &Problem,
    solution: Option<&Solution>,
) -> Result<()> {
    fs::write(path, to_csv(problem, solution))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(id: &str, lower: i64, upper: i64, size: i64) -> Buffer {
        Buffer::new(id, Interval::new(lower, upper), size)
    }

    #[test]
    fn test_to_csv_all_optional_columns() {
        let problem = Problem::new(
            vec![
                buffer("0", 5, 10, 15).with_hint(0),
                buffer("1", 6, 12, 18).with_alignment(2).with_gaps(vec![
                    Gap::new(Interval::new(7, 8)),
                    Gap::with_window(Interval::new(9, 10), Interval::new(1, 17)),
                ]),
            ],
            40,
        )
        .unwrap();

        assert_eq!(
            to_csv(&problem, None),
            "id,lower,upper,size,alignment,hint,gaps\n\
             0,5,10,15,1,0,\n\
             1,6,12,18,2,-1,7-8 9-10@1:17\n"
        );
    }

    #[test]
    fn test_to_csv_without_alignment() {
        let problem = Problem::new(
            vec![
                buffer("0", 5, 10, 15).with_hint(0),
                buffer("1", 6, 12, 18).with_gaps(vec![
                    Gap::new(Interval::new(7, 8)),
                    Gap::new(Interval::new(9, 10)),
                ]),
            ],
            40,
        )
        .unwrap();

        assert_eq!(
            to_csv(&problem, None),
            "id,lower,upper,size,hint,gaps\n0,5,10,15,0,\n1,6,12,18,-1,7-8 9-10\n"
        );
    }

    #[test]
    fn test_to_csv_without_hint() {
        let problem = Problem::new(
            vec![
                buffer("0", 5, 10, 15),
                buffer("1", 6, 12, 18).with_alignment(2).with_gaps(vec![
                    Gap::new(Interval::new(7, 8)),
                    Gap::with_window(Interval::new(9, 10), Interval::new(1, 17)),
                ]),
            ],
            40,
        )
        .unwrap();

        assert_eq!(
            to_csv(&problem, None),
            "id,lower,upper,size,alignment,gaps\n0,5,10,15,1,\n1,6,12,18,2,7-8 9-10@1:17\n"
        );
    }

    #[test]
    fn test_to_csv_without_gaps() {
        let problem = Problem::new(
            vec![
                buffer("0", 5, 10, 15).with_hint(0),
                buffer("1", 6, 12, 18).with_alignment(2),
            ],
            40,
        )
        .unwrap();

        assert_eq!(
            to_csv(&problem, None),
            "id,lower,upper,size,alignment,hint\n0,5,10,15,1,0\n1,6,12,18,2,-1\n"
        );
    }

    #[test]
    fn test_to_csv_with_solution() {
        let problem = Problem::new(
            vec![
                buffer("0", 5, 10, 15),
                buffer("1", 6, 12, 18).with_alignment(2).with_gaps(vec![
                    Gap::new(Interval::new(7, 8)),
                    Gap::new(Interval::new(9, 10)),
                ]),
            ],
            40,
        )
        .unwrap();
        let solution = Solution {
            offsets: vec![1, 21],
            height: None,
        };

        assert_eq!(
            to_csv(&problem, Some(&solution)),
            "id,lower,upper,size,alignment,gaps,offset\n\
             0,5,10,15,1,,1\n\
             1,6,12,18,2,7-8 9-10,21\n"
        );
    }

    #[test]
    fn test_to_csv_string_ids() {
        let problem = Problem::new(
            vec![
                buffer("Little", 5, 10, 15),
                buffer("Big", 6, 12, 18).with_alignment(2).with_gaps(vec![
                    Gap::new(Interval::new(7, 8)),
                    Gap::new(Interval::new(9, 10)),
                ]),
            ],
            40,
        )
        .unwrap();

        assert_eq!(
            to_csv(&problem, None),
            "id,lower,upper,size,alignment,gaps\nLittle,5,10,15,1,\nBig,6,12,18,2,7-8 9-10\n"
        );
    }

    #[test]
    fn test_to_csv_old_format() {
        let problem = Problem::new(
            vec![
                buffer("Little", 5, 10, 15),
                buffer("Big", 6, 12, 18).with_alignment(2).with_gaps(vec![
                    Gap::new(Interval::new(7, 8)),
                    Gap::new(Interval::new(9, 10)),
                ]),
            ],
            40,
        )
        .unwrap();

        assert_eq!(
            to_csv_with_format(&problem, None, CsvFormat::Old),
            "id,start,end,size,alignment,gaps\nLittle,5,9,15,1,\nBig,6,11,18,2,7-7 9-9\n"
        );
    }

    #[test]
    fn test_from_csv_problem_only() {
        let problem = from_csv("lower,size,id,upper\n6,18,1,12\n5,15,0,10\n").unwrap();

        assert_eq!(problem.capacity, 0);
        assert_eq!(problem.buffers.len(), 2);
        assert_eq!(problem.buffers[0].id, "1");
        assert_eq!(problem.buffers[0].lifespan, Interval::new(6, 12));
        assert_eq!(problem.buffers[0].size, 18);
        assert_eq!(problem.buffers[1].id, "0");
        assert_eq!(problem.buffers[1].lifespan, Interval::new(5, 10));
    }

    #[test]
    fn test_from_csv_with_alignment() {
        let problem = from_csv("begin,size,buffer,upper,alignment\n6,18,1,12,2\n5,15,0,10,1\n")
            .unwrap();

        assert_eq!(problem.buffers[0].alignment, 2);
        assert_eq!(problem.buffers[1].alignment, 1);
    }

    #[test]
    fn test_from_csv_with_hints() {
        let problem =
            from_csv("begin,size,buffer,upper,alignment,hint\n6,18,1,12,2,0\n5,15,0,10,1,-1\n")
                .unwrap();

        assert_eq!(problem.buffers[0].hint, Some(0));
        assert_eq!(problem.buffers[1].hint, None);
    }

    #[test]
    fn test_from_csv_with_empty_gaps() {
        let problem =
            from_csv("start,size,buffer_id,upper,alignment,gaps\n6,18,1,12,2,\n5,15,0,10,1,\n")
                .unwrap();

        assert!(problem.buffers[0].gaps.is_empty());
        assert!(problem.buffers[1].gaps.is_empty());
    }

    #[test]
    fn test_from_csv_with_gaps() {
        let problem = from_csv(
            "start,size,buffer,upper,alignment,gaps\n6,18,1,12,2,7-9 \n5,15,0,10,1,9-11 12-14@2:13\n",
        )
        .unwrap();

        let first = &problem.buffers[0];
        assert_eq!(first.gaps, vec![Gap::new(Interval::new(7, 9))]);

        let second = &problem.buffers[1];
        assert_eq!(
            second.gaps,
            vec![
                Gap::new(Interval::new(9, 11)),
                Gap::with_window(Interval::new(12, 14), Interval::new(2, 13)),
            ]
        );
    }

    #[test]
    fn test_from_csv_with_end_column() {
        let problem =
            from_csv("start,size,buffer,end,alignment,gaps\n6,18,1,11,2,7-8 \n5,15,0,9,1,9-10 12-13\n")
                .unwrap();

        // An inclusive end converts both lifespans and gap bounds.
        assert_eq!(problem.buffers[0].lifespan.upper, 12);
        assert_eq!(problem.buffers[0].gaps[0].lifespan, Interval::new(7, 9));
        assert_eq!(problem.buffers[1].lifespan.upper, 10);
    }

    #[test]
    fn test_from_csv_with_solution_offsets() {
        let problem = from_csv("start,size,offset,buffer,upper\n6,18,21,1,12\n5,15,1,0,10\n")
            .unwrap();

        assert_eq!(problem.buffers[0].offset, Some(21));
        assert_eq!(problem.buffers[1].offset, Some(1));
    }

    #[test]
    fn test_from_csv_rejects_bogus_inputs() {
        assert!(from_csv("start,size,buffer,upper\na,b,c,d\ne,f,g,h\n").is_err());
        assert!(from_csv("start,size,offset,buffer,upper\n6,18,a,1,12\n5,15,b,0,10\n").is_err());
    }

    #[test]
    fn test_from_csv_rejects_bogus_gaps() {
        assert!(from_csv("start,size,buffer,upper,gaps\n6,18,1,12,1-2-3\n5,15,0,10,\n").is_err());
        assert!(from_csv("start,size,buffer,upper,gaps\n6,18,1,12,A-B\n5,15,0,10,\n").is_err());
    }

    #[test]
    fn test_from_csv_rejects_missing_column() {
        assert!(from_csv("start,size,upper\n6,18,1,12\n5,15,10\n").is_err());
    }

    #[test]
    fn test_from_csv_rejects_duplicate_column() {
        assert!(
            from_csv("start,size,offset,buffer,upper,upper\n6,18,21,1,12\n5,15,1,0,10\n").is_err()
        );
    }

    #[test]
    fn test_from_csv_rejects_extra_fields() {
        assert!(from_csv("start,size,offset,buffer,upper\n6,18,21,1,12\n5,15,1,0,10,100\n").is_err());
    }

    #[test]
    fn test_round_trip() {
        let original = Problem::new(
            vec![
                buffer("buf1", 0, 10, 128).with_alignment(8),
                buffer("buf2", 5, 15, 256).with_alignment(16).with_gaps(vec![
                    Gap::new(Interval::new(6, 8)),
                    Gap::with_window(Interval::new(9, 11), Interval::new(0, 100)),
                ]),
            ],
            4096,
        )
        .unwrap();

        let reloaded = from_csv(&to_csv(&original, None)).unwrap();
        assert_eq!(reloaded.capacity, 0);
        assert_eq!(reloaded.buffers, original.buffers);
    }
}
