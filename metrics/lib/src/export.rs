//! Encoding query results as JSON, CSV or plain text and writing them to
//! stdout or a file.
//!
//! ## Examples
//!
//! ```
//! use metrics_lib::export::{Encoding, Exporter};
//!
//! let encoding: Encoding = "json".parse().unwrap();
//! let exporter = Exporter::stdout(encoding);
//! assert_eq!(exporter.encoding(), Encoding::Json);
//! ```

use crate::github::types::{
    Commit, CommitsComparison, Deployment, DeploymentWithCommits, PullRequest, Release, ReleaseWithPrs,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Writing to the target failed
    #[error("failed to write export: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization failed
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The value has no tabular form
    #[error("unable to export {0} to CSV")]
    UnsupportedCsv(&'static str),

    /// Unrecognized encoding name
    #[error("unknown encoding '{0}' (expected json, csv or plain)")]
    UnknownEncoding(String),
}

/// Output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Pretty-printed JSON with 4-space indentation
    #[default]
    Json,
    /// Comma-separated records with a header row
    Csv,
    /// Debug dump of the value
    Plain,
}

impl FromStr for Encoding {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            "csv" => Ok(Encoding::Csv),
            "plain" => Ok(Encoding::Plain),
            other => Err(ExportError::UnknownEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Json => "json",
            Encoding::Csv => "csv",
            Encoding::Plain => "plain",
        };
        f.write_str(name)
    }
}

/// A value that can be exported.
///
/// Every exportable value has a JSON and a plain form. Only list-like values
/// have a CSV form; the default `csv_records` reports them as unsupported.
pub trait Exportable: Serialize + fmt::Debug {
    /// Name used in error messages.
    const KIND: &'static str;

    /// Header row followed by one row per item.
    fn csv_records(&self) -> Result<Vec<Vec<String>>, ExportError> {
        Err(ExportError::UnsupportedCsv(Self::KIND))
    }
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn optional_timestamp(ts: &Option<DateTime<Utc>>) -> String {
    ts.as_ref().map(timestamp).unwrap_or_default()
}

fn header(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

const PULL_REQUEST_COLUMNS: &[&str] = &["number", "title", "createdAt", "updatedAt", "closedAt", "mergedAt"];

const RELEASE_COLUMNS: &[&str] = &[
    "name",
    "tagName",
    "isDraft",
    "isLatest",
    "isPrerelease",
    "description",
    "createdAt",
    "publishedAt",
];

const DEPLOYMENT_COLUMNS: &[&str] = &[
    "description",
    "createdAt",
    "updatedAt",
    "originalEnvironment",
    "latestEnvironment",
    "task",
    "state",
    "abbreviatedCommitSHA",
    "commitSHA",
];

fn release_row(r: &Release) -> Vec<String> {
    vec![
        r.name.clone(),
        r.tag_name.clone(),
        r.is_draft.to_string(),
        r.is_latest.to_string(),
        r.is_prerelease.to_string(),
        r.description.clone(),
        timestamp(&r.created_at),
        optional_timestamp(&r.published_at),
    ]
}

fn deployment_row(d: &Deployment) -> Vec<String> {
    vec![
        d.description.clone(),
        timestamp(&d.created_at),
        timestamp(&d.updated_at),
        d.original_environment.clone(),
        d.latest_environment.clone(),
        d.task.clone(),
        d.state.clone(),
        d.commit.abbreviated_sha.clone(),
        d.commit.sha.clone(),
    ]
}

impl Exportable for Vec<PullRequest> {
    const KIND: &'static str = "pull requests";

    fn csv_records(&self) -> Result<Vec<Vec<String>>, ExportError> {
        let rows = self.iter().map(|pr| {
            vec![
                pr.number.to_string(),
                pr.title.clone(),
                timestamp(&pr.created_at),
                timestamp(&pr.updated_at),
                optional_timestamp(&pr.closed_at),
                optional_timestamp(&pr.merged_at),
            ]
        });
        Ok(std::iter::once(header(PULL_REQUEST_COLUMNS)).chain(rows).collect())
    }
}

impl Exportable for Vec<Release> {
    const KIND: &'static str = "releases";

    fn csv_records(&self) -> Result<Vec<Vec<String>>, ExportError> {
        let rows = self.iter().map(release_row);
        Ok(std::iter::once(header(RELEASE_COLUMNS)).chain(rows).collect())
    }
}

impl Exportable for Vec<ReleaseWithPrs> {
    const KIND: &'static str = "releases with pull requests";

    fn csv_records(&self) -> Result<Vec<Vec<String>>, ExportError> {
        let mut columns = header(RELEASE_COLUMNS);
        columns.push("prs".into());

        let mut records = vec![columns];
        for r in self {
            let mut row = release_row(&r.release);
            row.push(serde_json::to_string(&r.prs)?);
            records.push(row);
        }
        Ok(records)
    }
}

impl Exportable for Vec<Deployment> {
    const KIND: &'static str = "deployments";

    fn csv_records(&self) -> Result<Vec<Vec<String>>, ExportError> {
        let rows = self.iter().map(deployment_row);
        Ok(std::iter::once(header(DEPLOYMENT_COLUMNS)).chain(rows).collect())
    }
}

impl Exportable for BTreeMap<String, Vec<DeploymentWithCommits>> {
    const KIND: &'static str = "deployments with commits";

    fn csv_records(&self) -> Result<Vec<Vec<String>>, ExportError> {
        let mut columns = header(DEPLOYMENT_COLUMNS);
        columns.push("deployedCommits".into());

        let rows = self.values().flatten().map(|d| {
            let shas: Vec<&str> = d.deployed_commits.iter().map(|c| c.sha.as_str()).collect();
            let mut row = deployment_row(&d.deployment);
            row.push(shas.join(","));
            row
        });
        Ok(std::iter::once(columns).chain(rows).collect())
    }
}

impl Exportable for DeploymentWithCommits {
    const KIND: &'static str = "deployed commits";
}

impl Exportable for CommitsComparison {
    const KIND: &'static str = "commit comparison";
}

impl Exportable for Vec<Commit> {
    const KIND: &'static str = "commit history";
}

/// Quotes a CSV field when it holds a separator, quote or line break.
///
/// ## Examples
///
/// ```
/// use metrics_lib::export::quote_csv_field;
///
/// assert_eq!(quote_csv_field("plain"), "plain");
/// assert_eq!(quote_csv_field("a,b"), "\"a,b\"");
/// assert_eq!(quote_csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
/// ```
pub fn quote_csv_field(field: &str) -> String {
    let needs_quotes = field.starts_with(' ') || field.contains([',', '"', '\n', '\r']);
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_csv<W: Write>(w: &mut W, records: &[Vec<String>]) -> io::Result<()> {
    for record in records {
        let line: Vec<String> = record.iter().map(|f| quote_csv_field(f)).collect();
        writeln!(w, "{}", line.join(","))?;
    }
    Ok(())
}

/// Writes `value` to `w` in the given encoding.
///
/// ## Errors
///
/// Returns `ExportError::UnsupportedCsv` before writing anything when CSV is
/// requested for a value without a tabular form.
pub fn encode<T, W>(encoding: Encoding, value: &T, w: &mut W) -> Result<(), ExportError>
where
    T: Exportable,
    W: Write,
{
    match encoding {
        Encoding::Json => {
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut *w, formatter);
            value.serialize(&mut serializer)?;
            writeln!(w)?;
        }
        Encoding::Csv => {
            let records = value.csv_records()?;
            write_csv(w, &records)?;
        }
        Encoding::Plain => writeln!(w, "{value:#?}")?,
    }
    Ok(())
}

/// Where exported data goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Stdout,
    /// Created, or truncated if it exists.
    File(PathBuf),
}

/// Encodes values and writes them to a target.
#[derive(Debug, Clone)]
pub struct Exporter {
    encoding: Encoding,
    target: Target,
}

impl Exporter {
    pub fn new(encoding: Encoding, target: Target) -> Self {
        Self { encoding, target }
    }

    pub fn stdout(encoding: Encoding) -> Self {
        Self::new(encoding, Target::Stdout)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Encodes `value` and writes it out.
    ///
    /// For file targets, an unsupported CSV value fails before the file is
    /// touched.
    pub fn export<T: Exportable>(&self, value: &T) -> Result<(), ExportError> {
        if self.encoding == Encoding::Csv {
            value.csv_records()?;
        }

        match &self.target {
            Target::Stdout => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                encode(self.encoding, value, &mut handle)?;
                handle.flush()?;
            }
            Target::File(path) => {
                let mut writer = BufWriter::new(File::create(path)?);
                encode(self.encoding, value, &mut writer)?;
                writer.flush()?;
            }
        }
        Ok(())
    }
}
