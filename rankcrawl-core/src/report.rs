// Ranked snapshot export and crawl reports

use crate::crawl::CrawlOutcome;
use crate::error::Result;
use crate::graph::GraphEdge;
use crate::rank::RankOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInfo {
    pub start_url: String,
    pub crawled_at: DateTime<Utc>,
    pub stop_reason: String,
    pub elapsed_ms: u64,
    pub batches: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub dangling_edge_count: usize,
    pub failure_count: usize,
    pub rank_iterations: usize,
    pub rank_converged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedNode {
    pub id: Uuid,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub indexed_at: DateTime<Utc>,
    pub rank: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureData {
    pub url: String,
    pub kind: String,
    pub message: String,
}

/// Node-link document for a finished, ranked crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSnapshot {
    pub directed: bool,
    pub multigraph: bool,
    pub graph: GraphInfo,
    pub nodes: Vec<RankedNode>,
    pub links: Vec<GraphEdge>,
    pub failures: Vec<FailureData>,
}

impl RankedSnapshot {
    pub fn from_crawl(outcome: &CrawlOutcome, ranks: &RankOutcome) -> Self {
        let snapshot = outcome.graph.snapshot();

        let nodes = snapshot
            .nodes
            .iter()
            .map(|node| RankedNode {
                id: node.id,
                url: node.url.clone(),
                title: node.title.clone(),
                description: node.description.clone(),
                indexed_at: node.indexed_at,
                rank: ranks.get(&node.url).unwrap_or(0.0),
            })
            .collect();

        let failures = outcome
            .failures
            .iter()
            .map(|f| FailureData {
                url: f.url.clone(),
                kind: f.error.kind().to_string(),
                message: f.error.to_string(),
            })
            .collect();

        RankedSnapshot {
            directed: true,
            multigraph: false,
            graph: GraphInfo {
                start_url: outcome.start_url.clone(),
                crawled_at: Utc::now(),
                stop_reason: outcome.stop_reason.as_str().to_string(),
                elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
                batches: outcome.batches,
                node_count: snapshot.node_count(),
                edge_count: snapshot.edge_count(),
                dangling_edge_count: snapshot.dangling_edges().count(),
                failure_count: outcome.failures.len(),
                rank_iterations: ranks.iterations,
                rank_converged: ranks.converged,
            },
            nodes,
            links: snapshot.edges,
            failures,
        }
    }

    /// Nodes ordered by descending rank, ties broken by URL.
    pub fn ranked_nodes(&self) -> Vec<&RankedNode> {
        let mut nodes: Vec<&RankedNode> = self.nodes.iter().collect();
        nodes.sort_by(|a, b| b.rank.total_cmp(&a.rank).then_with(|| a.url.cmp(&b.url)));
        nodes
    }

    pub fn render(&self, format: ReportFormat, top: usize) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(generate_rank_report(self, top)),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Saved ranked graph to {}", path.display());
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Where a snapshot lands when no output path is given.
pub fn default_output_path(now: DateTime<Utc>) -> PathBuf {
    PathBuf::from("data").join(format!("rankcrawl-{}.json", now.format("%Y%m%dT%H%M%SZ")))
}

/// Generate a plain text report listing the top `top` pages by rank
pub fn generate_rank_report(snapshot: &RankedSnapshot, top: usize) -> String {
    let info = &snapshot.graph;
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Start URL: {}\n", info.start_url));
    report.push_str(&format!("  Stopped by: {}\n", info.stop_reason));
    report.push_str(&format!("  Pages crawled: {}\n", info.node_count));
    report.push_str(&format!("  Links found: {}\n", info.edge_count));
    report.push_str(&format!("  Dangling links: {}\n", info.dangling_edge_count));
    report.push_str(&format!("  Failed fetches: {}\n", info.failure_count));
    report.push_str(&format!(
        "  Rank iterations: {}{}\n",
        info.rank_iterations,
        if info.rank_converged { "" } else { " (not converged)" }
    ));

    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    let ranked = snapshot.ranked_nodes();
    report.push_str(&format!("## Top {} pages\n", top.min(ranked.len())));
    for (position, node) in ranked.iter().take(top).enumerate() {
        report.push_str(&format!("  {:>3}. {:.6}  {}\n", position + 1, node.rank, node.url));
        if let Some(ref title) = node.title {
            report.push_str(&format!("        {}\n", title));
        }
    }

    if !snapshot.failures.is_empty() {
        report.push_str("\n## Failed fetches\n");
        for failure in &snapshot.failures {
            report.push_str(&format!("  [{}] {}\n", failure.kind, failure.url));
        }
    }

    report
}
