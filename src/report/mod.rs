pub mod types;

pub use types::{AggregateResult, Category, ClassifiedItem, OutputFormat};

use crate::github::EntityType;
use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unrecognised export format for {0}: use a .json or .csv file name")]
    UnknownExportFormat(PathBuf),
}

/// How the finished result should be shown and saved.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub export: Option<PathBuf>,
    pub show_details: bool,
}

/// Render or export a finished result.
///
/// - `json` prints to stdout, or writes `export` when given
/// - `csv` always writes a file, defaulting to `pr_results.csv` / `issue_results.csv`
/// - `table` prints the table, then exports by file extension when `export` is set
#[instrument(skip(result, options), fields(format = ?options.format, total = result.total()))]
pub fn output(result: &AggregateResult, options: &OutputOptions) -> Result<(), ReportError> {
    match options.format {
        OutputFormat::Json => match &options.export {
            Some(path) => export(result, path, OutputFormat::Json),
            None => {
                println!("{}", render_json(result)?);
                Ok(())
            }
        },
        OutputFormat::Csv => {
            let path = options
                .export
                .clone()
                .unwrap_or_else(|| PathBuf::from(default_csv_name(result.entity())));
            export(result, &path, OutputFormat::Csv)
        }
        OutputFormat::Table => {
            print_table(result, options.show_details);
            match &options.export {
                Some(path) => export(result, path, export_format_for(path)?),
                None => Ok(()),
            }
        }
    }
}

fn default_csv_name(entity: EntityType) -> &'static str {
    match entity {
        EntityType::PullRequest => "pr_results.csv",
        EntityType::Issue => "issue_results.csv",
    }
}

fn export_format_for(path: &Path) -> Result<OutputFormat, ReportError> {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("json") => Ok(OutputFormat::Json),
        Some("csv") => Ok(OutputFormat::Csv),
        _ => Err(ReportError::UnknownExportFormat(path.to_path_buf())),
    }
}

/// Write the rendered result to `path`. The content goes to a sibling temp
/// file first and is renamed into place, so the target is either complete
/// or untouched.
pub fn export(result: &AggregateResult, path: &Path, format: OutputFormat) -> Result<(), ReportError> {
    let contents = match format {
        OutputFormat::Json => render_json(result)?,
        OutputFormat::Csv => render_csv(result),
        OutputFormat::Table => return Err(ReportError::UnknownExportFormat(path.to_path_buf())),
    };

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".partial");
    let tmp = path.with_file_name(tmp_name);
    debug!(path = %path.display(), tmp = %tmp.display(), bytes = contents.len(), "writing export");

    std::fs::write(&tmp, contents)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        std::fs::remove_file(&tmp).ok();
        return Err(e.into());
    }

    info!(path = %path.display(), "exported results");
    println!("{} Results exported to {}", "✓".green(), path.display().to_string().cyan());
    Ok(())
}

#[derive(Serialize)]
struct PullRequestRow<'a> {
    number: u64,
    title: &'a str,
    url: &'a str,
    repository: &'a str,
    merged_at: Option<String>,
}

#[derive(Serialize)]
struct IssueRow<'a> {
    number: u64,
    title: &'a str,
    url: &'a str,
    repository: &'a str,
    state: String,
    created_at: String,
    closed_at: Option<String>,
    labels: &'a [String],
}

fn row_json(item: &ClassifiedItem) -> Result<Value, serde_json::Error> {
    let raw = &item.raw;
    if raw.pull_request_url.is_some() {
        serde_json::to_value(PullRequestRow {
            number: raw.number,
            title: &raw.title,
            url: &raw.url,
            repository: &raw.repository,
            merged_at: raw.merged_at.map(|d| d.to_rfc3339()),
        })
    } else {
        serde_json::to_value(IssueRow {
            number: raw.number,
            title: &raw.title,
            url: &raw.url,
            repository: &raw.repository,
            state: raw.state.to_string(),
            created_at: raw.created_at.to_rfc3339(),
            closed_at: raw.closed_at.map(|d| d.to_rfc3339()),
            labels: &raw.labels,
        })
    }
}

/// `{kind, period, statistics: {category: n, total}, items: {category: [..]}}`
pub fn to_json(result: &AggregateResult) -> Result<Value, serde_json::Error> {
    let mut statistics = Map::new();
    let mut items = Map::new();
    for (category, count) in result.counts() {
        statistics.insert(category.key().to_string(), json!(count));
    }
    for (category, list) in result.buckets() {
        let rows = list.iter().map(row_json).collect::<Result<Vec<_>, _>>()?;
        items.insert(category.key().to_string(), Value::Array(rows));
    }
    statistics.insert("total".to_string(), json!(result.total()));
    if result.entity() == EntityType::Issue {
        statistics.insert("excluded".to_string(), json!(result.excluded()));
    }

    let kind = match result.entity() {
        EntityType::PullRequest => "pull_requests",
        EntityType::Issue => "issues",
    };

    Ok(json!({
        "kind": kind,
        "period": result.period(),
        "statistics": statistics,
        "items": items,
    }))
}

pub fn render_json(result: &AggregateResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&to_json(result)?)
}

/// One row per item. Issues carry state, both dates and labels as extra columns.
pub fn render_csv(result: &AggregateResult) -> String {
    let header: &[&str] = match result.entity() {
        EntityType::PullRequest => &["Category", "Number", "Title", "Repository", "URL", "MergeOrCloseDate"],
        EntityType::Issue => &[
            "Category",
            "Number",
            "Title",
            "Repository",
            "URL",
            "State",
            "CreationDate",
            "ClosureDate",
            "Labels",
        ],
    };

    let mut out = String::new();
    push_csv_row(&mut out, header.iter().map(|h| h.to_string()));
    for (category, list) in result.buckets() {
        for item in list {
            let raw = &item.raw;
            let mut fields = vec![
                category.key().to_string(),
                raw.number.to_string(),
                raw.title.clone(),
                raw.repository.clone(),
                raw.url.clone(),
            ];
            match result.entity() {
                EntityType::PullRequest => {
                    fields.push(raw.resolved_at().map(|d| d.to_rfc3339()).unwrap_or_default());
                }
                EntityType::Issue => {
                    fields.push(raw.state.to_string());
                    fields.push(raw.created_at.to_rfc3339());
                    fields.push(raw.closed_at.map(|d| d.to_rfc3339()).unwrap_or_default());
                    fields.push(raw.labels.join(";"));
                }
            }
            push_csv_row(&mut out, fields.into_iter());
        }
    }
    out
}

fn push_csv_row(out: &mut String, fields: impl Iterator<Item = String>) {
    let row: Vec<String> = fields.map(|f| csv_field(&f)).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

/// Quote a field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Print the summary table and, optionally, the per-category listings.
fn print_table(result: &AggregateResult, show_details: bool) {
    println!();
    match result.entity() {
        EntityType::PullRequest => print_pull_request_table(result),
        EntityType::Issue => print_issue_table(result),
    }
    println!("{}", format!("Period: {}", result.period()).dimmed());

    if !show_details || result.total() == 0 {
        return;
    }
    for (category, list) in result.buckets() {
        if list.is_empty() {
            continue;
        }
        println!();
        println!("═══ {} ═══", colorize_category(category));
        for item in list {
            println!("  #{} - {} ({})", item.raw.number, item.raw.title, item.raw.repository);
        }
    }
    println!();
}

fn print_pull_request_table(result: &AggregateResult) {
    println!("{}", "Pull Request Review Analysis".magenta().bold());
    println!("{:<32} {:>8}", "Category".bold(), "Count".bold());
    for category in Category::PULL_REQUESTS {
        println!("{:<32} {:>8}", colorize_category(category), result.count(category));
    }
    println!("{:<32} {:>8}", "Total".bold(), result.total().to_string().bold());
}

fn print_issue_table(result: &AggregateResult) {
    let bug_open = result.count(Category::BugOpen);
    let bug_resolved = result.count(Category::BugResolved);
    let other_open = result.count(Category::NonBugOpen);
    let other_resolved = result.count(Category::NonBugResolved);

    println!("{}", "Bug and Non-Bug Analysis".magenta().bold());
    println!(
        "{:<10} {:>8} {:>8} {:>8}",
        "Category".bold(),
        "Open".bold(),
        "Resolved".bold(),
        "Total".bold()
    );
    println!(
        "{:<10} {:>8} {:>8} {:>8}",
        "Bug".red().bold(),
        bug_open,
        bug_resolved,
        bug_open + bug_resolved
    );
    println!(
        "{:<10} {:>8} {:>8} {:>8}",
        "Non-Bug".blue().bold(),
        other_open,
        other_resolved,
        other_open + other_resolved
    );
    println!(
        "{:<10} {:>8} {:>8} {:>8}",
        "Total".bold(),
        bug_open + other_open,
        bug_resolved + other_resolved,
        result.total().to_string().bold()
    );
}

fn colorize_category(category: Category) -> colored::ColoredString {
    let label = category.to_string();
    match category {
        Category::CleanApproval | Category::BugResolved | Category::NonBugResolved => label.green(),
        Category::RejectedThenApproved | Category::NonBugOpen => label.yellow(),
        Category::BugOpen => label.red(),
    }
}

#[cfg(test)]
mod tests {
    use super::types::fixtures::{issue_result, pr_result};
    use super::*;
    use std::collections::BTreeMap;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gh-analytics-{}-{}", std::process::id(), name))
    }

    /// Minimal RFC 4180 reader for checking exported files.
    fn parse_csv(text: &str) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        let mut row = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match (c, quoted) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                ('"', true) => quoted = false,
                ('"', false) => quoted = true,
                (',', false) => row.push(std::mem::take(&mut field)),
                ('\r', false) => {}
                ('\n', false) => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                (c, _) => field.push(c),
            }
        }
        rows
    }

    fn counts_of(result: &AggregateResult) -> BTreeMap<String, usize> {
        result
            .counts()
            .iter()
            .map(|(c, n)| (c.key().to_string(), *n))
            .collect()
    }

    #[test]
    fn test_pull_request_json_shape() {
        let value = to_json(&pr_result()).unwrap();
        assert_eq!(value["kind"], "pull_requests");
        assert_eq!(value["period"]["from"], "2024-03-01");
        assert_eq!(value["period"]["to"], "2024-12-31");
        assert_eq!(value["statistics"]["clean_approval"], 2);
        assert_eq!(value["statistics"]["rejected_then_approved"], 1);
        assert_eq!(value["statistics"]["total"], 3);
        let rejected = &value["items"]["rejected_then_approved"][0];
        assert_eq!(rejected["number"], 42);
        assert_eq!(rejected["repository"], "acme/widgets");
        assert_eq!(rejected["merged_at"], "2024-04-02T12:00:00+00:00");
        assert!(rejected.get("labels").is_none());
    }

    #[test]
    fn test_issue_json_shape() {
        let value = to_json(&issue_result()).unwrap();
        assert_eq!(value["kind"], "issues");
        assert_eq!(value["statistics"]["bug_open"], 1);
        assert_eq!(value["statistics"]["non_bug_open"], 0);
        assert_eq!(value["statistics"]["excluded"], 1);
        let open_bug = &value["items"]["bug_open"][0];
        assert_eq!(open_bug["state"], "open");
        assert_eq!(open_bug["closed_at"], Value::Null);
        assert_eq!(open_bug["labels"], json!(["bug", "p1"]));
    }

    #[test]
    fn test_json_export_round_trip_counts() {
        for result in [pr_result(), issue_result()] {
            let path = temp_path("roundtrip.json");
            export(&result, &path, OutputFormat::Json).unwrap();

            let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
            let mut counts = BTreeMap::new();
            for (key, n) in parsed["statistics"].as_object().unwrap() {
                if Category::from_key(key).is_some() {
                    counts.insert(key.clone(), n.as_u64().unwrap() as usize);
                }
            }
            assert_eq!(counts, counts_of(&result));
            std::fs::remove_file(&path).ok();
        }
    }

    #[test]
    fn test_csv_export_round_trip_counts() {
        for result in [pr_result(), issue_result()] {
            let path = temp_path("roundtrip.csv");
            export(&result, &path, OutputFormat::Csv).unwrap();

            let rows = parse_csv(&std::fs::read_to_string(&path).unwrap());
            let mut counts: BTreeMap<String, usize> = result
                .counts()
                .keys()
                .map(|c| (c.key().to_string(), 0))
                .collect();
            for row in &rows[1..] {
                *counts.get_mut(&row[0]).unwrap() += 1;
            }
            assert_eq!(counts, counts_of(&result));
            std::fs::remove_file(&path).ok();
        }
    }

    #[test]
    fn test_csv_columns_and_quoting() {
        let rows = parse_csv(&render_csv(&pr_result()));
        assert_eq!(
            rows[0],
            vec!["Category", "Number", "Title", "Repository", "URL", "MergeOrCloseDate"]
        );
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1][0], "clean_approval");
        let rejected = rows.iter().find(|r| r[1] == "42").unwrap();
        assert_eq!(rejected[0], "rejected_then_approved");
        assert_eq!(rejected[2], "Add login, with \"quotes\"");
        assert_eq!(rejected[5], "2024-04-02T12:00:00+00:00");

        let issue_rows = parse_csv(&render_csv(&issue_result()));
        assert_eq!(issue_rows[0].len(), 9);
        assert_eq!(issue_rows[1][8], "bug;p1");
        assert_eq!(issue_rows[2][5], "closed");
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_export_leaves_no_partial_file() {
        let path = temp_path("clean.json");
        export(&pr_result(), &path, OutputFormat::Json).unwrap();
        let mut partial = path.file_name().unwrap().to_os_string();
        partial.push(".partial");
        assert!(path.exists());
        assert!(!path.with_file_name(partial).exists());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_export_format_from_extension() {
        assert_eq!(export_format_for(Path::new("out.json")).unwrap(), OutputFormat::Json);
        assert_eq!(export_format_for(Path::new("out.CSV")).unwrap(), OutputFormat::Csv);
        assert!(export_format_for(Path::new("out.txt")).is_err());
        assert!(export_format_for(Path::new("out")).is_err());
    }

    #[test]
    fn test_table_export_with_unknown_extension_fails() {
        let options = OutputOptions {
            format: OutputFormat::Table,
            export: Some(temp_path("results.txt")),
            show_details: false,
        };
        let err = output(&pr_result(), &options).unwrap_err();
        assert!(matches!(err, ReportError::UnknownExportFormat(_)));
    }

    #[test]
    fn test_output_csv_to_explicit_path() {
        let path = temp_path("explicit.csv");
        let options = OutputOptions {
            format: OutputFormat::Csv,
            export: Some(path.clone()),
            show_details: true,
        };
        output(&issue_result(), &options).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Category,Number,Title,Repository,URL,State"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_default_csv_names() {
        assert_eq!(default_csv_name(EntityType::PullRequest), "pr_results.csv");
        assert_eq!(default_csv_name(EntityType::Issue), "issue_results.csv");
    }

    #[test]
    fn test_table_does_not_panic() {
        print_table(&pr_result(), true);
        print_table(&issue_result(), false);
    }
}
