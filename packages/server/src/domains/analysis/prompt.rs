use std::fmt::Write;

use super::options::OptimizationOption;
use super::proposal::CategoryProposal;
use crate::common::Service;

/// What the optimization prompt knows about the salon beyond the services.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub salon_name: Option<String>,
    pub overall_score: Option<i32>,
    pub weaknesses: Vec<String>,
    pub suggested_keywords: Vec<String>,
    pub category_proposal: Option<CategoryProposal>,
    /// The proposal was computed for a different category structure.
    pub proposal_is_stale: bool,
}

pub fn section_marker(option: OptimizationOption) -> &'static str {
    match option {
        OptimizationOption::Descriptions => "### SERVICE DESCRIPTIONS",
        OptimizationOption::Seo => "### SEO KEYWORDS",
        OptimizationOption::Categories => "### CATEGORY STRUCTURE",
        OptimizationOption::Order => "### SERVICE ORDER",
        OptimizationOption::Prices => "### PRICE FORMATTING",
        OptimizationOption::Duplicates => "### DUPLICATES AND ERRORS",
        OptimizationOption::Duration => "### DURATION NORMALIZATION",
        OptimizationOption::Tags => "### TAGS AND BADGES",
    }
}

fn section_body(option: OptimizationOption) -> &'static str {
    match option {
        OptimizationOption::Descriptions => {
            "Write or improve a short, benefit-oriented description (1-2 sentences) for every \
             service. Keep facts that are already there; never invent treatments or products."
        }
        OptimizationOption::Seo => {
            "Work the suggested keywords naturally into service names and descriptions. \
             Names must stay readable; no keyword stuffing."
        }
        OptimizationOption::Categories => {
            "Assign every service to a category following the proposed reorganization below. \
             Use the proposed category names exactly."
        }
        OptimizationOption::Order => {
            "Return services in the order a client should see them: most popular and \
             entry-level services first within each category."
        }
        OptimizationOption::Prices => {
            "Normalize price formatting to \"123 zł\" or \"od 123 zł\" for ranges. \
             Never change the amounts."
        }
        OptimizationOption::Duplicates => {
            "Fix typos, inconsistent capitalization and duplicated words in service names."
        }
        OptimizationOption::Duration => {
            "Normalize durations to minutes, e.g. \"60 min\" or \"90 min\". \
             Leave the field empty when unknown."
        }
        OptimizationOption::Tags => {
            "Add up to 2 short tags per service where they help the client \
             (e.g. \"Bestseller\", \"Nowość\", \"Dla par\")."
        }
    }
}

/// Assembles the single optimization prompt.
///
/// A section appears if and only if its option is selected; the category
/// section additionally requires a proposal in `context`. Missing context
/// degrades to explicit placeholder text.
pub fn build_optimization_prompt(
    options: &[OptimizationOption],
    context: &PromptContext,
    services: &[(&str, &Service)],
) -> String {
    let count = services.len();
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are optimizing the price list of a beauty salon. Write all texts in Polish."
    );
    prompt.push('\n');

    prompt.push_str("## SALON\n");
    let _ = writeln!(
        prompt,
        "Name: {}",
        context
            .salon_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("(salon name not provided)")
    );
    match context.overall_score {
        Some(score) => {
            let _ = writeln!(prompt, "Audit score: {}/100", score);
        }
        None => prompt.push_str("Audit score: (no audit score available)\n"),
    }
    prompt.push_str("Audit weaknesses:\n");
    if context.weaknesses.is_empty() {
        prompt.push_str("- (no audit findings)\n");
    } else {
        for weakness in &context.weaknesses {
            let _ = writeln!(prompt, "- {}", weakness);
        }
    }
    if context.suggested_keywords.is_empty() {
        prompt.push_str("Suggested keywords: (no suggested keywords)\n");
    } else {
        let _ = writeln!(
            prompt,
            "Suggested keywords: {}",
            context.suggested_keywords.join(", ")
        );
    }
    prompt.push('\n');

    prompt.push_str("## TASKS\n");
    for option in OptimizationOption::ALL {
        if !options.contains(&option) {
            continue;
        }
        if option == OptimizationOption::Categories {
            let Some(proposal) = &context.category_proposal else {
                continue;
            };
            let _ = writeln!(prompt, "{}", section_marker(option));
            let _ = writeln!(prompt, "{}", section_body(option));
            if context.proposal_is_stale {
                prompt.push_str(
                    "Note: the price list changed after this proposal was made; \
                     apply only the changes that still fit.\n",
                );
            }
            for change in &proposal.changes {
                let _ = writeln!(prompt, "- {} ({})", change.describe(), change.rationale());
            }
            prompt.push('\n');
            continue;
        }
        let _ = writeln!(prompt, "{}", section_marker(option));
        let _ = writeln!(prompt, "{}", section_body(option));
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "## SERVICES ({} total)", count);
    for (index, (category, service)) in services.iter().enumerate() {
        let _ = write!(
            prompt,
            "{}. [{}] {} | price: {}",
            index,
            category,
            service.name,
            if service.price.is_empty() { "-" } else { service.price.as_str() }
        );
        if let Some(duration) = &service.duration {
            let _ = write!(prompt, " | duration: {}", duration);
        }
        if let Some(description) = &service.description {
            let _ = write!(prompt, " | description: {}", description);
        }
        prompt.push('\n');
    }
    prompt.push('\n');

    prompt.push_str("## OUTPUT\n");
    let _ = writeln!(
        prompt,
        "You are processing exactly {count} services. Return exactly {count} entries, \
         one per service, with \"index\" values 0 to {last}. Do not add, drop or merge services.",
        count = count,
        last = count.saturating_sub(1)
    );
    prompt.push_str(
        "Respond with a JSON object only:\n\
         {\"services\": [{\"index\": 0, \"name\": \"...\", \"description\": \"...\", \
         \"price\": \"...\", \"duration\": \"...\", \"tags\": [\"...\"], \"category\": \"...\"}], \
         \"recommendations\": [\"...\"], \"qualityScore\": 0}\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::analysis::proposal::CategoryChange;
    use OptimizationOption::*;

    fn services() -> Vec<Service> {
        vec![
            Service::new("Manicure", "80 zł"),
            Service::new("Pedicure", "100 zł").with_duration("1h"),
            Service::new("Henna", "30 zł"),
        ]
    }

    fn proposal() -> CategoryProposal {
        CategoryProposal {
            changes: vec![CategoryChange::RenameCategory {
                from: "Inne".into(),
                to: "Brwi".into(),
                rationale: "generic name".into(),
            }],
            based_on: vec!["Inne".into()],
        }
    }

    fn build(options: &[OptimizationOption], context: &PromptContext) -> String {
        let owned = services();
        let flat: Vec<(&str, &Service)> = owned.iter().map(|s| ("Paznokcie", s)).collect();
        build_optimization_prompt(options, context, &flat)
    }

    #[test]
    fn test_sections_iff_selected() {
        let prompt = build(&[Descriptions, Prices], &PromptContext::default());
        assert!(prompt.contains(section_marker(Descriptions)));
        assert!(prompt.contains(section_marker(Prices)));
        for option in [Seo, Categories, Order, Duplicates, Duration, Tags] {
            assert!(!prompt.contains(section_marker(option)), "{} leaked", option);
        }
    }

    #[test]
    fn test_categories_section_needs_proposal() {
        let without = build(&[Categories], &PromptContext::default());
        assert!(!without.contains(section_marker(Categories)));

        let context = PromptContext {
            category_proposal: Some(proposal()),
            ..Default::default()
        };
        let with = build(&[Categories], &context);
        assert!(with.contains(section_marker(Categories)));
        assert!(with.contains("Rename category \"Inne\" to \"Brwi\""));
    }

    #[test]
    fn test_states_exact_service_count() {
        let prompt = build(&[Seo], &PromptContext::default());
        assert!(prompt.contains("exactly 3 services"));
        assert!(prompt.contains("Return exactly 3 entries"));
        assert!(prompt.contains("## SERVICES (3 total)"));
    }

    #[test]
    fn test_missing_context_uses_placeholders() {
        let prompt = build(&[Seo], &PromptContext::default());
        assert!(prompt.contains("(salon name not provided)"));
        assert!(prompt.contains("(no audit score available)"));
        assert!(prompt.contains("(no audit findings)"));
        assert!(prompt.contains("(no suggested keywords)"));
        assert!(!prompt.contains("None"));
        assert!(!prompt.contains("undefined"));
    }

    #[test]
    fn test_deterministic() {
        let context = PromptContext {
            salon_name: Some("Studio Urody Anna".into()),
            overall_score: Some(62),
            weaknesses: vec!["Brak opisów".into()],
            suggested_keywords: vec!["manicure".into()],
            ..Default::default()
        };
        assert_eq!(build(&[Seo, Tags], &context), build(&[Seo, Tags], &context));
        assert!(build(&[Seo], &context).contains("Audit score: 62/100"));
    }
}
