//! Report rendering
//!
//! Human-readable colored output for a [`CostReport`], plus pretty-printed
//! JSON for programmatic consumption. Field names and section order come
//! straight from the report contract; this layer never reorders them.

use crate::models::{CostReport, ReportSection};
use colored::Colorize;

pub struct DisplayManager;

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayManager {
    pub fn new() -> Self {
        Self
    }

    pub fn display_report(&self, report: &CostReport, json_output: bool) {
        if json_output {
            match serde_json::to_string_pretty(report) {
                Ok(json_str) => println!("{}", json_str),
                Err(e) => eprintln!("Error serializing report to JSON: {}", e),
            }
            return;
        }

        if report.total_calls == 0 {
            println!(
                "{}",
                "No telemetry records found for the selected window.".yellow()
            );
            return;
        }

        println!("\n{}", "=".repeat(72).bright_cyan());
        println!("{}", "Telemetry Cost Report".bright_white().bold());
        println!("{}", "=".repeat(72).bright_cyan());

        println!(
            "Window: {} → {} (last {} days)",
            report.window.start.bright_white(),
            report.window.end.bright_white(),
            report.window.days.to_string().bright_white().bold()
        );

        let mut active_filters = Vec::new();
        if let Some(project) = &report.filters.project {
            active_filters.push(format!("project={project}"));
        }
        if let Some(agent) = &report.filters.agent {
            active_filters.push(format!("agent={agent}"));
        }
        if let Some(model) = &report.filters.model {
            active_filters.push(format!("model={model}"));
        }
        if let Some(status) = &report.filters.status {
            active_filters.push(format!("status={status}"));
        }
        if !active_filters.is_empty() {
            println!("Filters: {}", active_filters.join(", ").bright_yellow());
        }

        println!(
            "Total calls: {}",
            report.total_calls.to_string().bright_white().bold()
        );
        println!(
            "Total cost: {}",
            format_currency(report.total_cost).bright_green().bold()
        );
        println!(
            "Tokens: input {} | output {} | total {}",
            report.total_tokens.input.to_string().bright_white(),
            report.total_tokens.output.to_string().bright_white(),
            report.total_tokens.total.to_string().bright_white()
        );

        self.render_section("Cost by model", &report.by_model);
        self.render_section("Cost by agent", &report.by_agent);
    }

    fn render_section(&self, title: &str, section: &ReportSection) {
        println!("\n{}", title.bright_white().bold());
        println!(
            "{:<40} {:>8} {:>14} {:>12}",
            "Name".bright_magenta(),
            "Calls".bright_magenta(),
            "Cost (USD)".bright_magenta(),
            "Tokens".bright_magenta()
        );

        if section.is_empty() {
            println!("{:<40} {:>8} {:>14} {:>12}", "(none)", 0, "$0.0000", 0);
            return;
        }

        for (name, bucket) in section.iter() {
            println!(
                "{:<40} {:>8} {:>14} {:>12}",
                name.bright_cyan(),
                bucket.calls,
                format_currency(bucket.cost_usd).bright_green(),
                bucket.tokens.total
            );
        }
    }
}

pub fn format_currency(value: f64) -> String {
    format!("${:.4}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_renders_four_decimals() {
        assert_eq!(format_currency(0.123), "$0.1230");
        assert_eq!(format_currency(0.0), "$0.0000");
    }
}
