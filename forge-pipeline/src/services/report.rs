//! Markdown idea report
//!
//! A read-only rendering of the ledger: system counters followed by the
//! highest-scoring ideas with the signals that earned their points.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::fmt::Write;

use crate::config::PipelineConfig;
use crate::db::posts::load_candidate;
use crate::db::reports::{ledger_stats, top_candidates, LedgerStats, RankedCandidate};
use crate::error::PipelineError;
use crate::services::insights::{derive_insights, IdeaInsights};
use crate::services::scoring::{ScoreBreakdown, ScoringEngine};

/// Ideas listed in the report
pub const REPORT_TOP_N: i64 = 20;

/// One ranked idea plus the signals behind its score
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub ranked: RankedCandidate,
    pub breakdown: Option<ScoreBreakdown>,
    pub insights: Option<IdeaInsights>,
}

impl ReportEntry {
    pub fn signals(&self) -> Vec<&'static str> {
        self.breakdown
            .as_ref()
            .map(ScoreBreakdown::signals)
            .unwrap_or_default()
    }
}

/// Top `limit` ideas with their breakdowns and insights
pub async fn load_report_entries(
    db: &SqlitePool,
    config: &PipelineConfig,
    limit: i64,
) -> Result<Vec<ReportEntry>, PipelineError> {
    let scoring = ScoringEngine::new(config.category_bonus.clone());

    let mut entries = Vec::new();
    for ranked in top_candidates(db, limit).await? {
        let candidate = load_candidate(db, &ranked.post_id).await?;
        entries.push(ReportEntry {
            breakdown: candidate.as_ref().map(|c| scoring.explain(c)),
            insights: candidate.as_ref().map(derive_insights),
            ranked,
        });
    }
    Ok(entries)
}

/// Load the ledger and render the report at `now`
pub async fn render_report(
    db: &SqlitePool,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> Result<String, PipelineError> {
    let stats = ledger_stats(db, config.threshold.raw_tenths(), &config.quota_day(now)).await?;
    let entries = load_report_entries(db, config, REPORT_TOP_N).await?;
    Ok(format_report(&stats, &entries, config, now))
}

/// Pure rendering step
pub fn format_report(
    stats: &LedgerStats,
    entries: &[ReportEntry],
    config: &PipelineConfig,
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let remaining = config
        .daily_build_limit
        .saturating_sub(stats.slots_used_today);

    // Writing into a String cannot fail
    let _ = writeln!(out, "# Idea Forge Report");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated {}",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "## Status");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Metric | Count |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| Posts seen | {} |", stats.posts_seen);
    let _ = writeln!(out, "| Candidates scored | {} |", stats.candidates_scored);
    let _ = writeln!(
        out,
        "| Above threshold ({:.1}) | {} |",
        config.threshold.raw(),
        stats.above_threshold
    );
    let _ = writeln!(
        out,
        "| Builds today ({}) | {} |",
        stats.quota_day, stats.builds_today
    );
    let _ = writeln!(
        out,
        "| Quota remaining | {} of {} |",
        remaining, config.daily_build_limit
    );
    for (status, count) in &stats.by_status {
        let _ = writeln!(out, "| {} | {} |", status, count);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Top {} ideas", entries.len());
    let _ = writeln!(out);
    if entries.is_empty() {
        let _ = writeln!(out, "No scored ideas yet.");
    }

    for (rank, entry) in entries.iter().enumerate() {
        let ranked = &entry.ranked;
        let title = ranked.title.as_deref().unwrap_or(&ranked.post_id);
        let score = &ranked.score;

        let _ = writeln!(out, "### {}. {}", rank + 1, title);
        let _ = writeln!(out);
        let _ = writeln!(out, "- **Post**: {} by {}", ranked.post_id, ranked.author);
        let _ = writeln!(
            out,
            "- **Score**: {:.1}/100 ({:.1}/15)",
            score.total, ranked.normalized
        );
        let _ = writeln!(
            out,
            "- **Breakdown**: technical {:.1}, business {:.1}, practical {:.1}, engagement {:.1}, category {:.1}",
            score.technical_innovation,
            score.business_potential,
            score.practical_value,
            score.engagement,
            score.category_bonus
        );
        let _ = writeln!(out, "- **Category**: {}", ranked.category);
        let status = ranked
            .status
            .map(|s| s.as_str())
            .unwrap_or("undecided");
        match &ranked.project_ref {
            Some(project_ref) => {
                let _ = writeln!(out, "- **Status**: {} ({})", status, project_ref);
            }
            None => {
                let _ = writeln!(out, "- **Status**: {}", status);
            }
        }
        let signals = entry.signals();
        if !signals.is_empty() {
            let _ = writeln!(out, "- **Signals**: {}", signals.join(", "));
        }
        if let Some(insights) = &entry.insights {
            if !insights.reasons.is_empty() {
                let _ = writeln!(out, "- **Why**: {}", insights.reasons.join("; "));
            }
            let directions: Vec<String> = insights
                .directions
                .iter()
                .map(|d| format!("{} ({})", d.description, d.priority.as_str()))
                .collect();
            let _ = writeln!(out, "- **Directions**: {}", directions.join(", "));
            let _ = writeln!(out, "- **Monetization**: {}", insights.monetization.join(", "));
        }
        let _ = writeln!(out);
    }

    out
}
