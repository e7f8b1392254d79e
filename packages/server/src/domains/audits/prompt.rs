use std::fmt::Write;

use crate::domains::analysis::{CategoryProposal, KeywordReport, ScoreBreakdown};

use super::models::ScrapedProfile;

/// Keywords listed in the audit prompt.
const PROMPT_KEYWORDS: usize = 15;

/// Prompt for the single model call of the analysis step.
pub fn build_audit_prompt(
    profile: &ScrapedProfile,
    keywords: &KeywordReport,
    breakdown: &ScoreBreakdown,
    proposal: &CategoryProposal,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are an expert in beauty salon marketing auditing a salon's online price list. \
         Write all texts in Polish.\n\n",
    );

    prompt.push_str("## SALON\n");
    let _ = writeln!(
        prompt,
        "Name: {}",
        profile
            .salon_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("(salon name not provided)")
    );
    if let Some(address) = profile.address.as_deref().filter(|a| !a.trim().is_empty()) {
        let _ = writeln!(prompt, "Address: {}", address);
    }
    let _ = writeln!(
        prompt,
        "{} categories, {} services",
        profile.categories.len(),
        profile.services_count()
    );
    prompt.push('\n');

    prompt.push_str("## STRUCTURAL CHECKS (0-100)\n");
    let _ = writeln!(prompt, "Description coverage: {}", breakdown.description_coverage);
    let _ = writeln!(prompt, "Duration coverage: {}", breakdown.duration_coverage);
    let _ = writeln!(prompt, "Naming quality: {}", breakdown.naming_quality);
    let _ = writeln!(prompt, "Category balance: {}", breakdown.category_balance);
    let _ = writeln!(prompt, "Weighted total: {}", breakdown.total);
    prompt.push('\n');

    let top = keywords.top_keywords(PROMPT_KEYWORDS);
    if top.is_empty() {
        prompt.push_str("Keywords found: (no industry keywords found)\n\n");
    } else {
        let _ = writeln!(prompt, "Keywords found: {}\n", top.join(", "));
    }

    if !proposal.is_empty() {
        prompt.push_str("## PROPOSED CATEGORY CHANGES\n");
        for change in &proposal.changes {
            let _ = writeln!(prompt, "- {}", change.describe());
        }
        prompt.push('\n');
    }

    prompt.push_str("## PRICE LIST\n");
    for category in &profile.categories {
        let _ = writeln!(prompt, "[{}]", category.name);
        for service in &category.services {
            let _ = write!(prompt, "- {} | {}", service.name, service.price);
            if let Some(duration) = &service.duration {
                let _ = write!(prompt, " | {}", duration);
            }
            if let Some(description) = &service.description {
                let _ = write!(prompt, " | {}", description);
            }
            prompt.push('\n');
        }
    }
    prompt.push('\n');

    prompt.push_str(
        "## OUTPUT\n\
         Respond with a JSON object only:\n\
         {\"overallScore\": 0-100, \"summary\": \"...\", \"strengths\": [\"...\"], \
         \"weaknesses\": [\"...\"], \"recommendations\": [\"...\"]}\n",
    );

    prompt
}
