//! Append-only plain-text chain log.
//!
//! ```text
//! #NWalk\tNStep\tGal\tFit
//! #<walkers>\t<iterations>\t<galaxy>
//! #<param>\t<param>...
//! #<feature>\t<feature>...
//! #<name>: <value|None>    <name>: <value|None>...
//! <walker>\t<space-joined values>\t<log_prob>
//! ```
//!
//! A walker index of 0 starts a new iteration.

use crate::domain::{FitError, FitResult};
use crate::numerics::percentile;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const TITLE_LINE: &str = "#NWalk\tNStep\tGal\tFit";
const SETTING_SEPARATOR: &str = "    ";

#[derive(Debug, Clone, PartialEq)]
pub struct ChainHeader {
    pub walkers: usize,
    pub iterations: usize,
    pub galaxy: String,
    pub parameters: Vec<String>,
    pub features: Vec<String>,
    /// `name → Some(value)` for fixed settings, `None` for sampled ones.
    pub settings: Vec<(String, Option<String>)>,
}

impl ChainHeader {
    pub fn render(&self) -> String {
        let settings = self
            .settings
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value.as_deref().unwrap_or("None")))
            .collect::<Vec<_>>()
            .join(SETTING_SEPARATOR);
        format!(
            "{}\n#{}\t{}\t{}\n#{}\n#{}\n#{}\n",
            TITLE_LINE,
            self.walkers,
            self.iterations,
            self.galaxy,
            self.parameters.join("\t"),
            self.features.join("\t"),
            settings
        )
    }

    fn parse(lines: &[&str], path: &Path) -> FitResult<Self> {
        let malformed = |reason: &str| {
            FitError::input_validation(
                "INPUT.CHAIN_HEADER",
                format!("'{}': {}", path.display(), reason),
            )
        };
        let [title, counts, parameters, features, settings] = lines else {
            return Err(malformed("expected 5 header lines"));
        };
        if title.trim_end() != TITLE_LINE {
            return Err(malformed("missing title line"));
        }

        let counts: Vec<&str> = counts.trim_start_matches('#').split('\t').collect();
        let [walkers, iterations, galaxy, ..] = counts[..] else {
            return Err(malformed("count line needs walkers, iterations and galaxy"));
        };
        let walkers = walkers
            .trim()
            .parse()
            .map_err(|_| malformed("walker count is not an integer"))?;
        let iterations = iterations
            .trim()
            .parse()
            .map_err(|_| malformed("iteration count is not an integer"))?;

        let split_tabs = |line: &str| {
            line.trim_start_matches('#')
                .split('\t')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        let settings = settings
            .trim_start_matches('#')
            .split(SETTING_SEPARATOR)
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| {
                let (name, value) = entry
                    .split_once(':')
                    .ok_or_else(|| malformed("setting entry lacks ':'"))?;
                let value = value.trim();
                let value = (value != "None").then(|| value.to_string());
                Ok((name.trim().to_string(), value))
            })
            .collect::<FitResult<Vec<_>>>()?;

        Ok(Self {
            walkers,
            iterations,
            galaxy: galaxy.trim().to_string(),
            parameters: split_tabs(parameters),
            features: split_tabs(features),
            settings,
        })
    }
}

fn io_error(path: &Path, action: &str, error: std::io::Error) -> FitError {
    FitError::io_system(
        "IO.CHAIN_LOG",
        format!("failed to {} chain log '{}': {}", action, path.display(), error),
    )
}

/// Buffered writer; iterations accumulate in memory until `flush`.
#[derive(Debug)]
pub struct ChainLogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    pending: String,
    pending_iterations: usize,
}

impl ChainLogWriter {
    /// Truncate `path` and write the header.
    pub fn create(path: impl AsRef<Path>, header: &ChainHeader) -> FitResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|error| io_error(&path, "create", error))?;
        let mut writer = Self::from_file(path, file);
        writer.pending.push_str(&header.render());
        writer.flush()?;
        Ok(writer)
    }

    /// Continue an existing log without rewriting its header.
    pub fn append(path: impl AsRef<Path>) -> FitResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|error| io_error(&path, "open", error))?;
        Ok(Self::from_file(path, file))
    }

    fn from_file(path: PathBuf, file: File) -> Self {
        Self {
            path,
            writer: BufWriter::new(file),
            pending: String::new(),
            pending_iterations: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pending_iterations(&self) -> usize {
        self.pending_iterations
    }

    pub fn record(&mut self, positions: &[Vec<f64>], log_prob: &[f64]) {
        for (walker, (position, log_prob)) in positions.iter().zip(log_prob).enumerate() {
            let values = position
                .iter()
                .map(|value| value.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            self.pending
                .push_str(&format!("{}\t{}\t{}\n", walker, values, log_prob));
        }
        self.pending_iterations += 1;
    }

    pub fn flush(&mut self) -> FitResult<()> {
        if !self.pending.is_empty() {
            self.writer
                .write_all(self.pending.as_bytes())
                .map_err(|error| io_error(&self.path, "write", error))?;
            self.pending.clear();
        }
        self.writer
            .flush()
            .map_err(|error| io_error(&self.path, "flush", error))?;
        self.pending_iterations = 0;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChainIteration {
    pub positions: Vec<Vec<f64>>,
    pub log_prob: Vec<f64>,
}

impl ChainIteration {
    pub fn walkers(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainLog {
    pub header: ChainHeader,
    pub iterations: Vec<ChainIteration>,
}

impl ChainLog {
    /// Iterations holding a row for every walker.
    pub fn complete_iterations(&self) -> impl Iterator<Item = &ChainIteration> + '_ {
        self.iterations
            .iter()
            .filter(|iteration| iteration.walkers() == self.header.walkers)
    }

    pub fn complete_iteration_count(&self) -> usize {
        self.complete_iterations().count()
    }

    pub fn last_complete_iteration(&self) -> Option<&ChainIteration> {
        self.complete_iterations().last()
    }
}

pub fn read_chain_log(path: impl AsRef<Path>) -> FitResult<ChainLog> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|error| io_error(path, "read", error))?;

    let header_lines: Vec<&str> = source
        .lines()
        .take_while(|line| line.starts_with('#'))
        .collect();
    let header = ChainHeader::parse(&header_lines, path)?;
    let width = header.parameters.len();

    let mut iterations: Vec<ChainIteration> = Vec::new();
    for (index, line) in source.lines().enumerate().skip(header_lines.len()) {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = |reason: String| {
            FitError::input_validation(
                "INPUT.CHAIN_LOG",
                format!("'{}' line {}: {}", path.display(), index + 1, reason),
            )
        };

        let fields: Vec<&str> = line.split('\t').collect();
        let [walker, values, log_prob] = fields[..] else {
            return Err(malformed(format!("expected 3 tab-separated fields, got {}", fields.len())));
        };
        let walker: usize = walker
            .trim()
            .parse()
            .map_err(|_| malformed(format!("invalid walker index '{}'", walker)))?;
        let position = values
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| malformed(error.to_string()))?;
        if position.len() != width {
            return Err(malformed(format!(
                "expected {} parameter values, got {}",
                width,
                position.len()
            )));
        }
        let log_prob: f64 = log_prob
            .trim()
            .parse()
            .map_err(|_| malformed(format!("invalid log-probability '{}'", log_prob)))?;

        if walker == 0 {
            iterations.push(ChainIteration::default());
        }
        let Some(current) = iterations.last_mut() else {
            return Err(malformed("first row must belong to walker 0".to_string()));
        };
        if walker != current.walkers() {
            return Err(malformed(format!(
                "walker {} out of order, expected {}",
                walker,
                current.walkers()
            )));
        }
        current.positions.push(position);
        current.log_prob.push(log_prob);
    }

    Ok(ChainLog { header, iterations })
}

/// 16th, 50th and 84th percentiles of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSummary {
    pub name: String,
    pub p16: f64,
    pub p50: f64,
    pub p84: f64,
}

impl ParameterSummary {
    pub fn lower_error(&self) -> f64 {
        self.p50 - self.p16
    }

    pub fn upper_error(&self) -> f64 {
        self.p84 - self.p50
    }
}

/// Percentile summary over complete iterations. A non-negative `burn_in`
/// drops that many leading iterations; a negative one keeps only the last
/// `|burn_in|`.
pub fn summarize_chain(log: &ChainLog, burn_in: i64) -> FitResult<Vec<ParameterSummary>> {
    let complete: Vec<&ChainIteration> = log.complete_iterations().collect();
    let magnitude = usize::try_from(burn_in.unsigned_abs()).unwrap_or(usize::MAX);
    let kept: &[&ChainIteration] = if burn_in >= 0 {
        &complete[magnitude.min(complete.len())..]
    } else {
        &complete[complete.len().saturating_sub(magnitude)..]
    };
    if kept.is_empty() {
        return Err(FitError::input_validation(
            "INPUT.CHAIN_EMPTY",
            format!(
                "no complete iterations left after burn-in {} ({} available)",
                burn_in,
                complete.len()
            ),
        ));
    }

    log.header
        .parameters
        .iter()
        .enumerate()
        .map(|(column, name)| {
            let samples: Vec<f64> = kept
                .iter()
                .flat_map(|iteration| iteration.positions.iter().map(move |row| row[column]))
                .filter(|value| value.is_finite())
                .collect();
            let quantile = |q: f64| {
                percentile(&samples, q).ok_or_else(|| {
                    FitError::numeric_degeneracy(
                        "NUMERIC.CHAIN_SUMMARY",
                        format!("parameter {} has no finite samples", name),
                    )
                })
            };
            Ok(ParameterSummary {
                name: name.clone(),
                p16: quantile(16.0)?,
                p50: quantile(50.0)?,
                p84: quantile(84.0)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ChainHeader, ChainLogWriter, read_chain_log, summarize_chain};
    use std::fs;
    use tempfile::TempDir;

    fn header(walkers: usize) -> ChainHeader {
        ChainHeader {
            walkers,
            iterations: 3,
            galaxy: "M85".to_string(),
            parameters: vec!["Age".to_string(), "Z".to_string()],
            features: vec!["FeH".to_string(), "NaI".to_string()],
            settings: vec![
                ("Age".to_string(), None),
                ("Z".to_string(), None),
                ("x1".to_string(), Some("1.3".to_string())),
            ],
        }
    }

    #[test]
    fn header_renders_the_documented_layout() {
        let rendered = header(4).render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "#NWalk\tNStep\tGal\tFit");
        assert_eq!(lines[1], "#4\t3\tM85");
        assert_eq!(lines[2], "#Age\tZ");
        assert_eq!(lines[3], "#FeH\tNaI");
        assert_eq!(lines[4], "#Age: None    Z: None    x1: 1.3");
    }

    #[test]
    fn written_logs_read_back_with_partial_tail() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("chain.dat");
        let mut writer = ChainLogWriter::create(&path, &header(2)).expect("writer");
        writer.record(&[vec![5.0, 0.1], vec![6.5, -0.2]], &[-10.5, f64::NEG_INFINITY]);
        writer.record(&[vec![5.5, 0.0], vec![7.0, -0.1]], &[-9.0, -8.25]);
        assert_eq!(writer.pending_iterations(), 2);
        writer.flush().expect("flush");
        drop(writer);

        let mut contents = fs::read_to_string(&path).expect("read");
        assert!(contents.contains("0\t5 0.1\t-10.5\n"));
        contents.push_str("0\t8 0.2\t-7\n");
        fs::write(&path, contents).expect("write partial");

        let log = read_chain_log(&path).expect("log");
        assert_eq!(log.header, header(2));
        assert_eq!(log.iterations.len(), 3);
        assert_eq!(log.complete_iteration_count(), 2);
        let last = log.last_complete_iteration().expect("complete iteration");
        assert_eq!(last.positions, vec![vec![5.5, 0.0], vec![7.0, -0.1]]);
        assert_eq!(log.iterations[0].log_prob[1], f64::NEG_INFINITY);
    }

    #[test]
    fn appending_continues_after_existing_rows() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("chain.dat");
        let mut writer = ChainLogWriter::create(&path, &header(2)).expect("writer");
        writer.record(&[vec![5.0, 0.1], vec![6.5, -0.2]], &[-1.0, -2.0]);
        writer.flush().expect("flush");
        drop(writer);

        let mut writer = ChainLogWriter::append(&path).expect("append");
        writer.record(&[vec![5.1, 0.1], vec![6.4, -0.2]], &[-1.5, -2.5]);
        writer.flush().expect("flush");

        let log = read_chain_log(&path).expect("log");
        assert_eq!(log.complete_iteration_count(), 2);
    }

    #[test]
    fn summary_honours_positive_and_negative_burn_in() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("chain.dat");
        let mut writer = ChainLogWriter::create(&path, &header(2)).expect("writer");
        for step in 0..10 {
            let age = step as f64;
            writer.record(&[vec![age, 0.0], vec![age, 0.0]], &[-1.0, -1.0]);
        }
        writer.flush().expect("flush");
        let log = read_chain_log(&path).expect("log");

        let all = summarize_chain(&log, 0).expect("summary");
        assert_eq!(all[0].name, "Age");
        assert!((all[0].p50 - 4.5).abs() < 1.0e-12);
        assert_eq!(all[1].p16, 0.0);

        let late = summarize_chain(&log, 8).expect("summary");
        assert!((late[0].p50 - 8.5).abs() < 1.0e-12);

        let last = summarize_chain(&log, -1).expect("summary");
        assert_eq!(last[0].p16, 9.0);
        assert_eq!(last[0].p84, 9.0);
        assert_eq!(last[0].lower_error(), 0.0);

        let error = summarize_chain(&log, 10).expect_err("nothing left");
        assert_eq!(error.placeholder(), "INPUT.CHAIN_EMPTY");
    }

    #[test]
    fn out_of_order_walkers_are_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("chain.dat");
        let mut contents = header(2).render();
        contents.push_str("1\t5 0.1\t-1\n");
        fs::write(&path, contents).expect("write");
        let error = read_chain_log(&path).expect_err("walker 1 first");
        assert_eq!(error.placeholder(), "INPUT.CHAIN_LOG");
    }
}
