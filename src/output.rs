use std::io::Write;

use anyhow::Result;
use owo_colors::OwoColorize;

use linkrot_core::{CrawlResult, LinkResult, LinkState};

/// Per-link line for the text format, emitted as results finalize.
/// Broken links are always shown; OK/SKIPPED only when `show_all`.
pub fn print_link(link: &LinkResult, show_all: bool) {
    let status = link
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    match link.state {
        LinkState::Broken => {
            if link.parent.is_empty() {
                println!("{} [{status}] {}", "✖".red(), link.url);
            } else {
                println!(
                    "{} [{status}] {} (found on {})",
                    "✖".red(),
                    link.url,
                    link.parent
                );
            }
        }
        LinkState::Ok if show_all => {
            println!("{} [{status}] {}", "✔".green(), link.url);
        }
        LinkState::Skipped if show_all => {
            println!("{} [{}] {}", "~".yellow(), "SKP".yellow(), link.url);
        }
        _ => {}
    }
}

pub fn print_summary(result: &CrawlResult) {
    let broken = result
        .links
        .iter()
        .filter(|link| link.state == LinkState::Broken)
        .count();
    println!();
    if result.passed {
        println!(
            "{} {} links checked, no broken links",
            "✔".green(),
            result.links.len()
        );
    } else {
        println!(
            "{} {} links checked, {} broken",
            "✖".red(),
            result.links.len(),
            broken.red()
        );
    }
}

pub fn write_json<W: Write>(writer: W, result: &CrawlResult) -> Result<()> {
    serde_json::to_writer_pretty(writer, result)?;
    Ok(())
}

/// CSV rows are `url,status,state,parent,failureDetails`, the last column
/// a JSON-encoded string.
pub fn write_csv<W: Write>(writer: W, result: &CrawlResult) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["url", "status", "state", "parent", "failureDetails"])?;
    for link in &result.links {
        let status = link.status.map(|s| s.to_string()).unwrap_or_default();
        let failures = if link.failure_details.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&link.failure_details)?
        };
        csv.write_record([
            link.url.as_str(),
            &status,
            &link.state.to_string(),
            &link.parent,
            &failures,
        ])?;
    }
    csv.flush()?;
    Ok(())
}
