use crate::model::{PipelineError, Result};
use crate::narrative::NarrativeContext;
use markdown_builder::{List, ListItem, Markdown};
use markdown_table::{Heading, HeadingAlignment, MarkdownTable};
use std::fs;
use std::path::{Path, PathBuf};

pub trait MarkdownReport {
    fn report_render(&self, narrative: &str) -> Result<String>;

    /// Writes the report into `out_dir`, named after the sprint.
    fn report_create(&self, narrative: &str, out_dir: &Path) -> Result<PathBuf>;
}

impl MarkdownReport for NarrativeContext {
    fn report_render(&self, narrative: &str) -> Result<String> {
        let mut doc = Markdown::new();

        let title = format!(
            "{} ({} - {})",
            self.sprint,
            self.window.start.format("%d.%m.%Y"),
            self.window.end.format("%d.%m.%Y"),
        );
        doc.header1(title);
        doc.paragraph(narrative.to_string());
        doc.add_kpis(self)?;
        doc.add_evidence(self)?;

        if !self.suggested_actions.is_empty() {
            doc.header2("Suggested actions");
            doc.add_list(self.suggested_actions.iter().cloned());
        }
        if !self.unavailable.is_empty() {
            doc.header2("Unavailable metrics");
            doc.add_list(self.unavailable.iter().map(|u| format!("*{}*: {}", u.kind, u.reason)));
        }
        Ok(doc.render())
    }

    fn report_create(&self, narrative: &str, out_dir: &Path) -> Result<PathBuf> {
        let file_name = self
            .sprint
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect::<String>();
        let path = out_dir.join(format!("{file_name}.md"));
        fs::create_dir_all(out_dir)?;
        fs::write(&path, self.report_render(narrative)?)?;
        Ok(path)
    }
}

trait MarkdownExt {
    fn add_kpis(&mut self, context: &NarrativeContext) -> Result<()>;

    fn add_evidence(&mut self, context: &NarrativeContext) -> Result<()>;

    fn add_table(&mut self, headings: &[&str], rows: Vec<Vec<String>>) -> Result<()>;

    fn add_list(&mut self, entries: impl Iterator<Item = String>);
}

impl MarkdownExt for Markdown {
    fn add_kpis(&mut self, context: &NarrativeContext) -> Result<()> {
        let kpis = &context.kpis;
        let counters = &context.counters;
        self.header2("Key figures");

        let mut rows = vec![
            vec![
                "Completed".to_string(),
                format!("**{}** / {}", context.totals.done, context.totals.total),
            ],
            vec![
                "Completion rate".to_string(),
                format!("{:.0}% (target {:.0}%)", kpis.completion_rate * 100.0, kpis.target_rate * 100.0),
            ],
            vec!["Remaining days".to_string(), kpis.remaining_days.to_string()],
            vec!["Required per day".to_string(), kpis.required_per_day.to_string()],
            vec!["Risk".to_string(), format!("**{:.0}%**", kpis.risk_percent)],
            vec!["Overdue".to_string(), count(counters.overdue)],
            vec!["Due soon".to_string(), count(counters.due_soon)],
            vec!["High priority to do".to_string(), count(counters.high_priority_todo)],
            vec!["Blocked".to_string(), counters.blocked.to_string()],
            vec!["Reopened".to_string(), count(counters.reopened)],
            vec!["Unassigned".to_string(), count(counters.unassigned)],
        ];
        if let Some(velocity) = &context.velocity {
            rows.push(vec![
                "Velocity".to_string(),
                format!(
                    "{:.1} average, {:.1} last ({} sprints)",
                    velocity.average_completed, velocity.last_completed, velocity.samples
                ),
            ]);
        }
        if let Some(burn) = context.daily_burn {
            rows.push(vec!["Points burned per day".to_string(), format!("{burn:.1}")]);
        }
        if let Some(bottleneck) = &context.bottleneck {
            rows.push(vec![
                "Bottleneck".to_string(),
                format!("{} ({:.1} days on average)", bottleneck.status, bottleneck.mean_days),
            ]);
        }
        if let Some(review) = context.review_mean_days {
            rows.push(vec!["Average review time".to_string(), format!("{review:.1} days")]);
        }
        if let Some(busiest) = &context.busiest_assignee {
            rows.push(vec![
                "Most open items".to_string(),
                format!("{} ({})", busiest.name, busiest.open_items),
            ]);
        }
        self.add_table(&["", "Value"], rows)?;

        if !kpis.risk_breakdown.is_empty() {
            let rows = kpis
                .risk_breakdown
                .iter()
                .map(|c| vec![c.factor.to_string(), format!("{:.1}", c.points)])
                .collect();
            self.add_table(&["Risk factor", "Points"], rows)?;
        }
        Ok(())
    }

    fn add_evidence(&mut self, context: &NarrativeContext) -> Result<()> {
        self.header2("Evidence");
        if context.evidence.is_empty() {
            self.paragraph("Nothing stands out.".to_string());
            return Ok(());
        }
        let rows = context
            .evidence
            .iter()
            .map(|e| {
                vec![
                    format!("**{}**", e.key),
                    e.title.clone(),
                    e.status.to_string(),
                    e.assignee.clone().unwrap_or_else(|| "*unassigned*".to_string()),
                    e.justification.clone(),
                ]
            })
            .collect();
        self.add_table(&["Key", "Title", "Status", "Assignee", "Why"], rows)
    }

    fn add_table(&mut self, headings: &[&str], rows: Vec<Vec<String>>) -> Result<()> {
        let headings = headings
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let alignment = if i == 0 { None } else { Some(HeadingAlignment::Center) };
                Heading::new(h.to_string(), alignment)
            })
            .collect::<Vec<_>>();
        let mut md_table = MarkdownTable::new(rows);
        md_table.with_headings(headings);
        let table = md_table
            .as_markdown()
            .map_err(|_| PipelineError::Report("table rows do not match its headings".to_string()))?;
        // Paragraphs wrap at 80 columns, which would split table rows.
        self.elements.push(Box::new(table));
        Ok(())
    }

    fn add_list(&mut self, entries: impl Iterator<Item = String>) {
        let items = entries.map(ListItem::from).collect();
        self.list(List::unordered_with(items));
    }
}

fn count(value: Option<u64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |n| n.to_string())
}
