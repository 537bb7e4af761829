use anyhow::{Context, Result};
use std::path::PathBuf;
use surfmap::{
    config::Config,
    discovery::{AdmissionCoordinator, ExtractedForm, UrlExtractor},
    util::truncate_str,
};
use url::Url;

/// Width of the candidate column
const CANDIDATE_WIDTH: usize = 60;

pub fn run_extract(config: Config, file: PathBuf, base: String, admitted_only: bool) -> Result<()> {
    let html = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read '{}'", file.display()))?;
    let page_url = Url::parse(&base).with_context(|| format!("Invalid base URL '{}'", base))?;

    let coordinator = AdmissionCoordinator::new(&config).context("Invalid configuration")?;
    let extraction = UrlExtractor::new().extract_html(&html, &page_url);

    let mut admitted = 0;
    for candidate in &extraction.candidates {
        for decision in coordinator.admit(&candidate.value, candidate.base.as_str())? {
            if decision.allow {
                admitted += 1;
            } else if admitted_only {
                continue;
            }
            println!(
                "{:<width$} {}",
                truncate_str(&candidate.value, CANDIDATE_WIDTH),
                decision,
                width = CANDIDATE_WIDTH
            );
        }
    }

    for form in &extraction.forms {
        let action = if form.action.is_empty() {
            page_url.clone()
        } else {
            page_url.join(&form.action)?
        };
        if form.is_post() {
            let new = coordinator.admit_post(action.as_str(), &form.method, &form.param_names);
            if new || !admitted_only {
                println!(
                    "{:<width$} {} [{}]{}",
                    action.as_str(),
                    form.method,
                    form.param_names.join(", "),
                    if new { "" } else { " (duplicate)" },
                    width = CANDIDATE_WIDTH
                );
            }
        } else {
            let candidate = ExtractedForm {
                action: action.to_string(),
                ..form.clone()
            }
            .get_candidate();
            for decision in coordinator.admit(&candidate, page_url.as_str())? {
                if decision.allow {
                    admitted += 1;
                } else if admitted_only {
                    continue;
                }
                println!("{:<width$} {}", "(GET form)", decision, width = CANDIDATE_WIDTH);
            }
        }
    }

    println!(
        "\n{} candidates, {} admitted, {} forms",
        extraction.candidates.len(),
        admitted,
        extraction.forms.len()
    );
    for (name, value) in coordinator.stats() {
        if value > 0 {
            println!("  {:<48} {}", name, value);
        }
    }
    Ok(())
}
