//! Output formatting shared by the pipeline commands.

use buccotiles::config::format_size;
use buccotiles::country::{Country, StageOutput};
use buccotiles::pipeline::{RunSummary, UploadOutcome};
use buccotiles::stage::StageTally;
use console::style;

/// Print one line per stage, followed by its failures.
pub fn print_tallies(tallies: &[StageTally]) {
    for tally in tallies {
        let line = tally.to_string();
        if tally.all_succeeded() {
            println!("  {} {}", style("ok").green(), line);
        } else {
            println!("  {} {}", style("!!").red(), line);
            for (path, reason) in &tally.failed {
                println!("       {}: {}", path.display(), first_line(reason));
            }
        }
    }
}

/// Print the final archive outcome.
pub fn print_final_output(output: &StageOutput) {
    match output {
        StageOutput::Succeeded(path) => println!("Final archive: {}", path.display()),
        StageOutput::Failed(reason) => println!("Final archive: {} ({})", style("failed").red(), first_line(reason)),
        StageOutput::NotStarted => println!("Final archive: not produced"),
    }
}

/// Print the upload outcome.
pub fn print_upload(outcome: &UploadOutcome) {
    match outcome {
        UploadOutcome::Disabled => println!("Upload:        disabled"),
        UploadOutcome::Skipped => println!("Upload:        skipped, nothing to send"),
        UploadOutcome::Uploaded { key, bytes } => {
            println!("Upload:        {} ({})", key, format_size(*bytes))
        }
        UploadOutcome::Failed(reason) => println!("Upload:        {} ({})", style("failed").red(), reason),
    }
}

/// Print a whole run.
pub fn print_run_summary(summary: &RunSummary) {
    println!();
    println!("{}", style("Pipeline Summary").bold());
    println!("Started:       {}", summary.started_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Elapsed:       {}", format_elapsed(summary.elapsed()));
    println!("Countries:     {} ({})", summary.countries.len(), summary.countries.join(", "));
    println!();
    print_tallies(&summary.tallies);
    println!();
    print_final_output(&summary.final_output);
    print_upload(&summary.upload);
}

/// Print how far every country has got.
pub fn print_country_stages(countries: &[Country]) {
    println!("{:<6} {:<22} {}", "Code", "Stage", "Admin levels");
    for country in countries {
        let levels: Vec<String> = country.admin.keys().map(|l| l.to_string()).collect();
        println!("{:<6} {:<22} {}", country.code, format!("{:?}", country.stage()), levels.join(" "));
    }
}

/// `1h 02m 03s`, `4m 05s`, `6s`.
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Tool failures carry whole stderr dumps; the first line is enough here.
fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(chrono::Duration::seconds(6)), "6s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(245)), "4m 05s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(3723)), "1h 02m 03s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(-5)), "0s");
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("command failed\nstderr: boom"), "command failed");
        assert_eq!(first_line(""), "");
    }
}
